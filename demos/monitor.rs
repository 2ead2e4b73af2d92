use ariston_net::{AristonClientBuilder, Config};
use std::env;
use std::time::Duration;

#[tokio::main]
async fn main() -> ariston_net::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => Config::load(path)?,
        None => {
            let username = env::var("ARISTON_USERNAME")
                .expect("usage: monitor [config.toml] or set ARISTON_USERNAME/ARISTON_PASSWORD");
            let password = env::var("ARISTON_PASSWORD").expect("ARISTON_PASSWORD not set");
            Config::new(username, password)
        }
    };

    let client = AristonClientBuilder::from_config(&config)?
        .on_event(|event| {
            println!("{event:?}");
        })
        .on_snapshot(|state| {
            println!(
                "{:?} | CH {:?} {:.1}\u{00b0}C (room {:.1}\u{00b0}C) | DHW {:.0}\u{00b0}C{}",
                state.mode,
                state.ch_mode,
                state.ch_set_temperature,
                state.detected_temperature,
                state.dhw_set_temperature,
                if state.flame { " | FLAME" } else { "" },
            );
        })
        .build()?;

    println!("Polling {} every {:?}...", client.name(), config.poll_interval());
    client.start();

    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        if client.is_stale() {
            eprintln!(
                "Data stale, last fetch {} s ago",
                client.state_age().map_or(0, |a| a.num_seconds())
            );
        }
    }
}
