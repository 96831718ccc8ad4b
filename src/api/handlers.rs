use actix_web::{web, HttpResponse, Responder};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use pow_ledger::blockchain::{
    Address, Block, BlockEntry, Blockchain, TransactionMiner, TransactionPool, Wallet,
};

/// Everything a request handler can reach
#[derive(Debug, Clone)]
pub struct NodeState {
    pub blockchain: Blockchain,
    pub pool: TransactionPool,
    pub wallet: Wallet,
    pub miner: TransactionMiner,
}

impl NodeState {
    pub fn new(blockchain: Blockchain, wallet: Wallet) -> Self {
        let pool = TransactionPool::new();
        let miner = TransactionMiner::new(blockchain.clone(), pool.clone(), wallet.clone());

        NodeState {
            blockchain,
            pool,
            wallet,
            miner,
        }
    }
}

/// Data structure for the node state
pub type NodeData = web::Data<NodeState>;

/// Response for the blocks endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    #[schema(value_type = Object)]
    pub chain: Vec<Block>,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// Arbitrary content stored in the block
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

/// Response for the mine endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    #[schema(value_type = Object)]
    pub block: Block,
}

/// Request for the transact endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactRequest {
    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: u64,
}

/// Response for the wallet endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletInfoResponse {
    /// The wallet's address
    pub address: String,

    /// The balance reconstructed from the chain
    pub balance: u64,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    /// Whether blocks are hashed, linked and mined correctly
    pub structure_valid: bool,

    /// Whether the embedded transactions follow the ledger rules
    pub transactions_valid: bool,
}

/// Request for the replace chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ReplaceChainRequest {
    /// The candidate chain, genesis first
    #[schema(value_type = Object)]
    pub chain: Vec<Block>,
}

fn error_response(status: actix_web::http::StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message }))
}

/// Get the full blockchain
#[utoipa::path(
    get,
    path = "/api/v1/blocks",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_blocks(state: NodeData) -> impl Responder {
    let chain = state.blockchain.chain();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain: chain.as_ref().clone(),
    })
}

/// Mine a block of raw data
///
/// Mining runs on the blocking thread pool
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(state: NodeData, mine_req: web::Json<MineRequest>) -> impl Responder {
    let blockchain = state.blockchain.clone();
    let data = vec![BlockEntry::raw(mine_req.into_inner().data)];

    match web::block(move || blockchain.add_block(data)).await {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Mined".to_string(),
            block,
        }),
        Err(err) => error_response(
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to mine block: {}", err),
        ),
    }
}

/// Send funds from the node's wallet
///
/// Extends the wallet's pending transaction if there is one
#[utoipa::path(
    post,
    path = "/api/v1/transact",
    request_body = TransactRequest,
    responses(
        (status = 201, description = "Transaction added to the pool"),
        (status = 400, description = "Invalid transaction data")
    )
)]
pub async fn transact(state: NodeData, transact_req: web::Json<TransactRequest>) -> impl Responder {
    let TransactRequest { recipient, amount } = transact_req.into_inner();

    let recipient: Address = match recipient.parse() {
        Ok(address) => address,
        Err(err) => {
            return error_response(
                actix_web::http::StatusCode::BAD_REQUEST,
                format!("Invalid recipient: {}", err),
            );
        }
    };

    let result = match state.pool.existing_transaction(state.wallet.address()) {
        Some(mut transaction) => transaction
            .update(state.wallet.key_pair(), recipient, amount)
            .map(|_| transaction)
            .map_err(|err| err.to_string()),
        None => state
            .wallet
            .create_transaction(
                recipient,
                amount,
                &state.blockchain.chain(),
                state.blockchain.config().starting_balance,
            )
            .map_err(|err| err.to_string()),
    };

    match result {
        Ok(transaction) => {
            state.pool.set_transaction(transaction.clone());
            HttpResponse::Created().json(transaction)
        }
        Err(err) => {
            warn!("Rejected transaction request: {}", err);
            error_response(actix_web::http::StatusCode::BAD_REQUEST, err)
        }
    }
}

/// Get the pending transaction pool
#[utoipa::path(
    get,
    path = "/api/v1/transaction-pool",
    responses(
        (status = 200, description = "Pending transactions keyed by id")
    )
)]
pub async fn get_transaction_pool(state: NodeData) -> impl Responder {
    HttpResponse::Ok().json(state.pool.transaction_map())
}

/// Mine the pending pool
///
/// Valid pending transactions and a reward for the node's wallet go into a new block
#[utoipa::path(
    post,
    path = "/api/v1/mine-transactions",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_transactions(state: NodeData) -> impl Responder {
    let miner = state.miner.clone();

    match web::block(move || miner.mine_transactions()).await {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            message: "Pending transactions mined".to_string(),
            block,
        }),
        Err(err) => error_response(
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to mine transactions: {}", err),
        ),
    }
}

/// Get the node wallet's address and balance
#[utoipa::path(
    get,
    path = "/api/v1/wallet-info",
    responses(
        (status = 200, description = "Wallet info retrieved successfully", body = WalletInfoResponse)
    )
)]
pub async fn wallet_info(state: NodeData) -> impl Responder {
    let address = state.wallet.address();

    HttpResponse::Ok().json(WalletInfoResponse {
        address: address.to_string(),
        balance: state.blockchain.balance_of(address),
    })
}

/// Get the balance of any address
#[utoipa::path(
    get,
    path = "/api/v1/wallet/balance/{address}",
    responses(
        (status = 200, description = "Wallet balance retrieved successfully", body = WalletInfoResponse)
    )
)]
pub async fn get_wallet_balance(state: NodeData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());

    HttpResponse::Ok().json(WalletInfoResponse {
        balance: state.blockchain.balance_of(&address),
        address: address.0,
    })
}

/// Validate the local chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(state: NodeData) -> impl Responder {
    let chain = state.blockchain.chain();

    HttpResponse::Ok().json(ValidationResponse {
        structure_valid: Blockchain::is_valid_chain(&chain),
        transactions_valid: state.blockchain.valid_transaction_data(&chain),
    })
}

/// Offer a chain to replace the local one
///
/// The chain is adopted only if it is longer and passes structural and
/// ledger validation. Mined transactions are then dropped from the pool.
#[utoipa::path(
    post,
    path = "/api/v1/chain/replace",
    request_body = ReplaceChainRequest,
    responses(
        (status = 200, description = "Chain replaced"),
        (status = 400, description = "Chain rejected")
    )
)]
pub async fn replace_chain(
    state: NodeData,
    replace_req: web::Json<ReplaceChainRequest>,
) -> impl Responder {
    let blockchain = state.blockchain.clone();
    let pool = state.pool.clone();
    let chain = replace_req.into_inner().chain;

    let result = web::block(move || {
        blockchain.replace_chain_with(chain, true, |adopted| {
            pool.clear_blockchain_transactions(adopted)
        })
    })
    .await;

    match result {
        Ok(Ok(())) => {
            let length = state.blockchain.chain().len();
            info!("Adopted chain of length {}", length);
            HttpResponse::Ok().json(serde_json::json!({
                "message": "Chain replaced",
                "length": length
            }))
        }
        Ok(Err(err)) => error_response(actix_web::http::StatusCode::BAD_REQUEST, err.to_string()),
        Err(err) => error_response(
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to replace chain: {}", err),
        ),
    }
}
