#[tokio::main]
async fn main() {
    if let Err(e) = doorplan_lib::run().await {
        eprintln!("doorplan: {e}");
        std::process::exit(1);
    }
}
