//! Demonstrates retry with a fixed delay ending in a fallback value.
use ninegates::{FallbackPolicy, FallbackValue, RetryError, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct Unavailable(usize);

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upstream unavailable (attempt {})", self.0)
    }
}

impl std::error::Error for Unavailable {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let attempts = AtomicUsize::new(0);
    let policy = RetryPolicy::builder().max_retries(3).delay(Duration::from_millis(50)).build();

    // Flaky upstream: fails twice, then answers.
    let value = policy
        .execute(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Unavailable(n))
                } else {
                    Ok(n * 10)
                }
            }
        })
        .await?;
    println!("recovered after {} attempts: {}", attempts.load(Ordering::SeqCst), value);

    // Dead upstream: every attempt fails, the fallback answers once.
    let guarded = policy.clone().with_fallback(|| async { Ok::<_, Unavailable>(false) });
    let healthy = guarded.execute(|| async { Err::<bool, _>(Unavailable(0)) }).await?;
    println!("health check with fallback: {}", healthy);

    // Without a fallback the caller sees every recorded failure.
    let err = policy.execute(|| async { Err::<bool, _>(Unavailable(0)) }).await.unwrap_err();
    if let RetryError::Exhausted { attempts, failures } = &err {
        println!("gave up after {} attempts ({} failures recorded)", attempts, failures.len());
    }

    // Fallback without retry.
    let once = FallbackPolicy::new(FallbackValue::new(String::from("cached profile")));
    let profile = once.execute(|| async { Err::<String, _>(Unavailable(1)) }).await?;
    println!("profile: {}", profile);

    Ok(())
}
