use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;

// Create the ledger and mine a first block to a fresh wallet so there is
// something to spend
fn initialize_blockchain(config: config::LedgerConfig) -> anyhow::Result<blockchain::Blockchain> {
    let blockchain = blockchain::Blockchain::with_config(config);
    info!(
        "Created ledger with difficulty {} and mining reward {}",
        blockchain.difficulty(),
        blockchain.mining_reward()
    );

    let wallet = blockchain.crypto().generate_wallet();
    info!("Created test wallet with address: {}", wallet.address());
    info!("Test wallet private key: {}", hex::encode(wallet.export_secret_key()));

    blockchain
        .mine_pending_transactions(wallet.address())
        .context("failed to mine the first block")?;
    info!(
        "Test wallet balance: {}",
        blockchain.get_balance_of(wallet.address())
    );

    Ok(blockchain)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_latest_block,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::validate_chain,
        api::handlers::create_wallet,
        api::handlers::get_wallet
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Address,
            blockchain::DigitalSignature,
            api::schema::ErrorResponse,
            api::handlers::ChainResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::WalletResponse,
            api::handlers::WalletInfoResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger API endpoints")
    ),
    info(
        title = "Ledger API",
        version = "0.1.0",
        description = "A minimal proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::load_config().context("failed to load configuration")?;

    let blockchain = web::Data::new(initialize_blockchain(config.ledger)?);

    let bind = (config.server.host.clone(), config.server.port);
    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(blockchain.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind(bind)
    .context("failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server failed")
}
