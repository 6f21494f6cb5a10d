mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use common::{drain, running_system, Counter, Echo, Exclusive, GetCount, Increment, Recorder};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use troupe::{Actor, ActorError, ActorPath, Context, Message};

#[test_log::test(tokio::test)]
async fn test_echo_round_trip() -> Result<()> {
    let system = running_system().await?;
    let echo = system
        .create_actor(ActorPath::parse("/user/echo")?, Echo)
        .await?;

    assert_eq!(echo.path().as_str(), "/user/echo");
    assert_eq!(echo.name(), "echo");

    let reply: String = echo.ask("hello".to_string()).await?;
    assert_eq!(reply, "hello");

    system.shutdown().await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_counter_counts_every_tell() -> Result<()> {
    let system = running_system().await?;
    let counter = system.spawn("counter", Counter::default()).await?;

    for _ in 0..100 {
        counter.tell(Increment, None)?;
    }
    let count: u64 = counter.ask(GetCount).await?;
    assert_eq!(count, 100);

    system.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifo_per_sender() -> Result<()> {
    let system = running_system().await?;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let recorder = system.spawn("recorder", Recorder::new(seen_tx)).await?;

    for n in 0..1_000u64 {
        recorder.tell(n, None)?;
    }
    system.stop_actor(&recorder).await?;

    let seen = drain(&mut seen_rx);
    assert_eq!(seen, (0..1_000u64).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifo_per_sender_with_concurrent_senders() -> Result<()> {
    let system = running_system().await?;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let recorder = system.spawn("recorder", Recorder::new(seen_tx)).await?;

    // Sender k sends k*1000.., so each sender's subsequence must stay ordered.
    let mut senders = Vec::new();
    for k in 0..4u64 {
        let recorder = recorder.clone();
        senders.push(tokio::spawn(async move {
            for n in 0..250u64 {
                recorder.tell(k * 1_000 + n, None).unwrap();
            }
        }));
    }
    for sender in senders {
        sender.await?;
    }
    system.stop_actor(&recorder).await?;

    let seen = drain(&mut seen_rx);
    assert_eq!(seen.len(), 1_000);
    for k in 0..4u64 {
        let from_k: Vec<u64> = seen.iter().copied().filter(|n| n / 1_000 == k).collect();
        assert_eq!(from_k, (0..250).map(|n| k * 1_000 + n).collect::<Vec<_>>());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handlers_never_overlap() -> Result<()> {
    let system = running_system().await?;
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let actor = system
        .spawn(
            "exclusive",
            Exclusive {
                in_flight: in_flight.clone(),
                max_seen: max_seen.clone(),
            },
        )
        .await?;

    let mut senders = Vec::new();
    for _ in 0..8 {
        let actor = actor.clone();
        senders.push(tokio::spawn(async move {
            for _ in 0..10 {
                actor.tell((), None).unwrap();
            }
        }));
    }
    for sender in senders {
        sender.await?;
    }
    system.stop_actor(&actor).await?;

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_ask_times_out_when_nobody_replies() -> Result<()> {
    let system = running_system().await?;
    let counter = system.spawn("silent", Counter::default()).await?;

    let started = Instant::now();
    let result = counter
        .ask_timeout::<u64>(Increment, Duration::from_millis(100))
        .await;
    let elapsed = started.elapsed();

    match result {
        Err(ActorError::Timeout { target, elapsed: reported }) => {
            assert_eq!(target, "/user/silent");
            assert!(reported >= Duration::from_millis(100));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(1_000), "took {:?}", elapsed);

    // The actor keeps working after a timed out ask.
    let count: u64 = counter.ask(GetCount).await?;
    assert_eq!(count, 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_ask_with_wrong_reply_type() -> Result<()> {
    let system = running_system().await?;
    let echo = system.spawn("echo", Echo).await?;

    let result = echo.ask::<u64>("not a number").await;
    assert!(matches!(result, Err(ActorError::TypeMismatch { .. })));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_ask_terminated_actor_fails_fast() -> Result<()> {
    let system = running_system().await?;
    let echo = system.spawn("echo", Echo).await?;
    system.stop_actor(&echo).await?;

    let started = Instant::now();
    let result = echo.ask::<String>("late".to_string()).await;
    assert_eq!(result, Err(ActorError::Undeliverable(echo.path().clone())));
    assert!(started.elapsed() < Duration::from_millis(100));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_ask_dead_letters_is_unsupported() -> Result<()> {
    let system = running_system().await?;
    let result = system.dead_letters().ask::<u64>(1u64).await;
    assert!(matches!(result, Err(ActorError::Unsupported(_))));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_messages_do_not_nest() -> Result<()> {
    let system = running_system().await?;
    let echo = system.spawn("echo", Echo).await?;

    let reply: u64 = echo.ask(Message::new(7u64)).await?;
    assert_eq!(reply, 7);
    Ok(())
}

/// Reports whether a sender was visible for each tagged message. Tag 0 fails.
struct SenderSpy {
    seen: mpsc::UnboundedSender<(u64, bool)>,
}

impl Actor for SenderSpy {
    async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> Result<()> {
        let Some(tag) = message.downcast_ref::<u64>().copied() else {
            return Ok(());
        };
        let _ = self.seen.send((tag, ctx.sender().is_some()));
        match tag {
            0 => Err(anyhow!("tag zero")),
            1 => {
                ctx.reply(tag)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[test_log::test(tokio::test)]
async fn test_sender_is_scoped_to_one_message() -> Result<()> {
    let system = running_system().await?;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let spy = system.spawn("spy", SenderSpy { seen: seen_tx }).await?;
    let bystander = system.spawn("bystander", Counter::default()).await?;

    assert_eq!(spy.ask::<u64>(1u64).await?, 1);
    spy.tell(2u64, None)?;
    spy.tell(0u64, Some(&bystander))?;
    spy.tell(3u64, None)?;
    assert_eq!(spy.ask::<u64>(1u64).await?, 1);

    assert_eq!(
        drain(&mut seen_rx),
        vec![(1, true), (2, false), (0, true), (3, false), (1, true)]
    );

    Ok(())
}
