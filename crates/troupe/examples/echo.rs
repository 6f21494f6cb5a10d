//! Runs an echo actor and a counter, then shuts the system down.
//!
//! ```sh
//! cargo run --example echo -- path/to/troupe.toml
//! ```

use anyhow::Result;
use tracing::info;
use troupe::{init_logging, Actor, ActorSystem, Context, Message, SystemConfig};

struct Echo;

impl Actor for Echo {
    async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> Result<()> {
        if let Some(text) = message.downcast_ref::<String>() {
            info!(from = ?ctx.sender().map(|s| s.path().to_string()), %text, "echoing");
        }
        ctx.reply(message)?;
        Ok(())
    }
}

struct Tick;
struct Total;

#[derive(Default)]
struct Counter {
    ticks: u64,
}

impl Actor for Counter {
    async fn on_start(&mut self, ctx: &mut Context) -> Result<()> {
        info!(path = %ctx.path(), "counter starting");
        Ok(())
    }

    async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> Result<()> {
        if message.is::<Tick>() {
            self.ticks += 1;
        } else if message.is::<Total>() {
            ctx.reply(self.ticks)?;
        }
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &mut Context) -> Result<()> {
        info!(ticks = self.ticks, "counter stopping");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => SystemConfig::from_file(path)?,
        None => SystemConfig::default().with_name("echo-demo"),
    };
    init_logging(&config.logging)?;

    let system = ActorSystem::new(config);
    system.start().await?;

    let echo = system.spawn("echo", Echo).await?;
    let counter = system.spawn("counter", Counter::default()).await?;

    let reply: String = echo.ask("hello, troupe".to_string()).await?;
    info!(%reply, "echo answered");

    for _ in 0..10 {
        counter.tell(Tick, None)?;
    }
    let total: u64 = counter.ask(Total).await?;
    info!(total, "counter answered");

    for actor in system.actors() {
        info!(path = %actor.path, id = %actor.id, started = actor.started, "live actor");
    }

    system.shutdown().await?;
    Ok(())
}
