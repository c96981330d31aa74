#[tokio::main]
async fn main() {
    storefront::start_server().await;
}
