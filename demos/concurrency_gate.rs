//! Demonstrates a rejecting concurrency gate and a run-once latch sharing one registry.
use ninegates::{ConcurrencyGate, ExecutionLatch, GateRegistry, Rejection};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let gate = ConcurrencyGate::rejecting(1)?;
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_for_task = counter.clone();
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let holder = tokio::spawn({
        let gate = gate.clone();
        async move {
            let counter = counter_for_task;
            gate.invoke(|| async {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = started_tx.send(());
                let _ = release_rx.await;
                Ok::<_, std::io::Error>("report rendered")
            })
            .await
        }
    });

    started_rx.await?;

    let rejected = gate.invoke(|| async { Ok::<_, std::io::Error>("second render") }).await?;
    println!("second caller: {:?}", rejected);
    assert_eq!(rejected.rejection(), Some(Rejection::Saturated { in_flight: 1, max: 1 }));

    let _ = release_tx.send(());
    println!("holder: {:?}", holder.await??);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let latches: GateRegistry<ExecutionLatch> = GateRegistry::new();
    for round in 0..3 {
        let latch = latches.get_or_insert_with("Startup.migrate", ExecutionLatch::new);
        let outcome = latch
            .invoke(|| async move {
                println!("running migrations (round {})", round);
                Ok::<_, std::io::Error>(())
            })
            .await?;
        println!("round {}: executed = {}", round, outcome.is_executed());
    }

    Ok(())
}
