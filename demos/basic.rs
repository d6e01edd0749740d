use std::time::Duration;

use resilient_http::{Backoff, ClientOptions, ResilientClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("RESILIENT_HTTP_URL")
        .unwrap_or_else(|_| "https://httpbin.org/status/200".to_owned());

    let opts = ClientOptions::from_env()?
        .concurrency(3)
        .backoff(Backoff::ExponentialJitter)
        .keep_log(true);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let client = ResilientClient::with_http_client(http)
        .with_options(opts)
        .with_log_writer(std::io::stderr());

    match client.get(&url).await {
        Ok(response) => println!("{} {}", response.status(), url),
        Err(err) => println!("gave up on {url}: {err}"),
    }

    if let Some(tag) = client.last_success() {
        println!("decided by worker {} on retry {}", tag.worker, tag.retry);
    }
    print!("{}", client.log_string());

    Ok(())
}
