//! Example health client
//!
//! Run with:
//! cargo run --example client

use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let channel = tonic::transport::Channel::from_static("http://localhost:50051")
        .connect()
        .await?;
    let mut client = HealthClient::new(channel);

    println!("=== Check ===");
    let response = client
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await?;
    println!("Overall status: {:?}", response.into_inner().status());

    // Unknown services fail with NOT_FOUND and are reported as notices.
    match client
        .check(HealthCheckRequest {
            service: "unknown.Service".to_string(),
        })
        .await
    {
        Ok(response) => println!("Unexpected status: {:?}", response.into_inner().status()),
        Err(status) => println!("Check failed as expected: {}", status),
    }

    println!("\n=== Watch ===");
    let mut updates = client
        .watch(HealthCheckRequest {
            service: String::new(),
        })
        .await?
        .into_inner();
    if let Some(update) = updates.message().await? {
        println!("Watch update: {:?}", update.status());
    }

    Ok(())
}
