#[tokio::main]
async fn main() {
    altiplano_backend::run().await;
}
