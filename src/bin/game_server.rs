use std::sync::Arc;

use anyhow::{Context as _, Result};
use lodestone::config::ServerConfig;
use lodestone::context::Context;
use lodestone::core::Clock;
use lodestone::diagnostics::Diagnostics;
use lodestone::network::ddos::{IpBlockList, IpReputation};
use lodestone::servers::game::GameServer;
use lodestone::world::lobby::LobbyWorld;
use lodestone::world::World;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut conf_file = "conf/server.yaml".to_string();
    let mut auto_create = true;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "--h" | "--?" | "/?" => {
                println!("Usage: game_server [--conf FILE] [--no-auto-create]");
                return Ok(());
            }
            "--conf" if i + 1 < args.len() => { i += 1; conf_file = args[i].clone(); }
            "--no-auto-create" => auto_create = false,
            _ => {}
        }
        i += 1;
    }

    let config = ServerConfig::from_file(&conf_file)
        .with_context(|| format!("Cannot load config: {}", conf_file))?;

    tracing::info!("[game] Game Server Started.");

    let ctx = Context::new(
        config,
        Clock::new(),
        Arc::new(LobbyWorld::new(auto_create)) as Arc<dyn World>,
        Arc::new(IpBlockList::new()) as Arc<dyn IpReputation>,
        Diagnostics::spawn_forwarder(),
    )?;

    let server = GameServer::bind(Arc::new(ctx)).await?;
    server
        .run(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("[game] Shutting down...");
        })
        .await
}
