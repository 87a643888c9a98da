#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be populated
    let _ = dotenvy::dotenv();

    deploygate::bootstrapper::run().await
}
