use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pow_ledger::blockchain::{Blockchain, Wallet};
use pow_ledger::config::NodeConfig;

mod api;

/// Location of the optional node configuration file
const CONFIG_PATH: &str = "node.toml";

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_blocks,
        api::handlers::mine_block,
        api::handlers::transact,
        api::handlers::get_transaction_pool,
        api::handlers::mine_transactions,
        api::handlers::wallet_info,
        api::handlers::get_wallet_balance,
        api::handlers::validate_chain,
        api::handlers::replace_chain
    ),
    components(
        schemas(
            api::handlers::ChainResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::TransactRequest,
            api::handlers::WalletInfoResponse,
            api::handlers::ValidationResponse,
            api::handlers::ReplaceChainRequest
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node API endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "0.1.0",
        description = "A single-node proof-of-work ledger",
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

    let config = NodeConfig::load(CONFIG_PATH)?;
    let blockchain = Blockchain::with_config(config.ledger);
    blockchain.verify_integrity()?;

    let wallet = Wallet::new();
    info!("Node wallet address: {}", wallet.address());

    let state = web::Data::new(api::NodeState::new(blockchain, wallet));
    let bind = (config.server.host.clone(), config.server.port);

    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi)
            )
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
