#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tokio::time::Duration;
use troupe::{Actor, ActorSystem, Context, Message, SystemConfig};

pub async fn running_system() -> Result<ActorSystem> {
    running_system_with(SystemConfig::default().with_name("test")).await
}

pub async fn running_system_with(config: SystemConfig) -> Result<ActorSystem> {
    let system = ActorSystem::new(config);
    system.start().await?;
    Ok(system)
}

/// Replies with whatever it receives.
pub struct Echo;

impl Actor for Echo {
    async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> Result<()> {
        ctx.reply(message)?;
        Ok(())
    }
}

pub struct Increment;
pub struct GetCount;

#[derive(Default)]
pub struct Counter {
    pub count: u64,
}

impl Actor for Counter {
    async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> Result<()> {
        if message.is::<Increment>() {
            self.count += 1;
        } else if message.is::<GetCount>() {
            ctx.reply(self.count)?;
        }
        Ok(())
    }
}

/// Forwards every `u64` it receives to a channel, optionally sleeping first.
pub struct Recorder {
    pub seen: mpsc::UnboundedSender<u64>,
    pub delay: Duration,
}

impl Recorder {
    pub fn new(seen: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            seen,
            delay: Duration::ZERO,
        }
    }
}

impl Actor for Recorder {
    async fn on_receive(&mut self, message: Message, _ctx: &mut Context) -> Result<()> {
        if let Some(n) = message.downcast_ref::<u64>() {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.seen
                .send(*n)
                .map_err(|_| anyhow!("recorder channel closed"))?;
        }
        Ok(())
    }
}

/// Lifecycle hook calls observed by a [`Probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Start,
    Receive(String),
    Restart(String),
    Stop,
}

pub struct Fail(pub &'static str);

/// Reports every hook call; `Fail` makes `on_receive` return an error.
pub struct Probe {
    pub hooks: mpsc::UnboundedSender<Hook>,
    pub fail_restart: bool,
}

impl Probe {
    pub fn new(hooks: mpsc::UnboundedSender<Hook>) -> Self {
        Self {
            hooks,
            fail_restart: false,
        }
    }
}

impl Actor for Probe {
    async fn on_start(&mut self, _ctx: &mut Context) -> Result<()> {
        let _ = self.hooks.send(Hook::Start);
        Ok(())
    }

    async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> Result<()> {
        if let Some(Fail(reason)) = message.downcast_ref::<Fail>() {
            let _ = self.hooks.send(Hook::Receive(format!("fail:{}", reason)));
            return Err(anyhow!("{}", reason));
        }
        if let Some(text) = message.downcast_ref::<&'static str>() {
            let _ = self.hooks.send(Hook::Receive(text.to_string()));
            ctx.reply(text.len())?;
        }
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &mut Context) -> Result<()> {
        let _ = self.hooks.send(Hook::Stop);
        Ok(())
    }

    async fn on_restart(&mut self, error: anyhow::Error, _ctx: &mut Context) -> Result<()> {
        let _ = self.hooks.send(Hook::Restart(error.to_string()));
        if self.fail_restart {
            return Err(anyhow!("cannot recover from {}", error));
        }
        Ok(())
    }
}

/// Tracks how many handlers are in flight at once.
pub struct Exclusive {
    pub in_flight: Arc<AtomicUsize>,
    pub max_seen: Arc<AtomicUsize>,
}

impl Actor for Exclusive {
    async fn on_receive(&mut self, _message: Message, _ctx: &mut Context) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collect everything currently buffered in `rx`.
pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}
