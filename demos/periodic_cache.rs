//! Demonstrates a periodic refresher keeping a TTL cache warm.
use ninegates::{PeriodicConfig, PeriodicScheduler, ResultCache};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let cache: ResultCache<u64> = ResultCache::with_ttl(Duration::from_millis(250))?;
    let version = Arc::new(AtomicU64::new(0));

    let refresher = PeriodicScheduler::new(
        PeriodicConfig::new(Duration::from_millis(300)).allow_overlap(false),
        {
            let cache = cache.clone();
            let version = version.clone();
            move || {
                let cache = cache.clone();
                let version = version.clone();
                async move {
                    let current = cache
                        .invoke(|| async {
                            Ok::<_, std::io::Error>(version.fetch_add(1, Ordering::SeqCst) + 1)
                        })
                        .await?;
                    println!("refresher sees version {}", current);
                    Ok::<_, std::io::Error>(())
                }
            }
        },
    )?;

    refresher.start()?;
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let seen = cache.invoke(|| async { Ok::<_, std::io::Error>(0) }).await?;
        println!("reader sees version {} (fresh: {})", seen, cache.is_fresh());
    }
    refresher.stop();

    println!(
        "firings: {}, failures: {}, skipped: {}",
        refresher.firings(),
        refresher.failures(),
        refresher.skipped()
    );
    Ok(())
}
