use ironfhir_server::{AppConfig, ServerBuilder, init_tracing};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AppConfig::from_env();
    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {err}");
        std::process::exit(1);
    }

    let server = ServerBuilder::new().with_config(config).build();
    if let Err(err) = server.run().await {
        eprintln!("server error: {err}");
    }
}
