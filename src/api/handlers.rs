use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::schema::ErrorResponse;
use crate::blockchain::{Address, Block, Blockchain, BlockchainError, Transaction};

/// Data structure for the blockchain state
pub type BlockchainData = web::Data<Blockchain>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The recipient's address
    pub to_address: String,

    /// The amount to transfer
    pub amount: f64,

    /// The sender's private key (hex, used for signing)
    pub private_key: String,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The signed transaction now waiting to be mined
    pub transaction: Transaction,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// The address receiving the mining reward
    pub miner_address: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,

    /// The wallet's private key (hex encoded)
    pub private_key: String,
}

/// Response for the wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletInfoResponse {
    /// The wallet's address
    pub address: String,

    /// Balance replayed from the chain
    pub balance: f64,

    /// Every chained transaction involving the wallet
    pub transactions: Vec<Transaction>,
}

fn bad_request(error: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new(error))
}

/// Get the full blockchain
///
/// Returns the entire blockchain and its validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.get_chain();
    let is_valid = blockchain.is_chain_valid();

    let response = ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    };

    HttpResponse::Ok().json(response)
}

/// Get the latest block
#[utoipa::path(
    get,
    path = "/api/v1/blocks/latest",
    responses(
        (status = 200, description = "Latest block retrieved successfully", body = Block)
    )
)]
pub async fn get_latest_block(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.get_latest_block())
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(blockchain: BlockchainData) -> impl Responder {
    let transactions = blockchain.get_pending_transactions();
    HttpResponse::Ok().json(transactions)
}

/// Create a new transaction
///
/// Signs a transfer from the wallet owning `private_key` and adds it to the
/// pending transactions
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction created successfully", body = TransactionResponse),
        (status = 400, description = "Invalid transaction data", body = ErrorResponse)
    )
)]
pub async fn new_transaction(
    blockchain: BlockchainData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let to_address: Address = match transaction_req.to_address.parse() {
        Ok(address) => address,
        Err(err) => return bad_request(format!("Invalid recipient address: {}", err)),
    };

    let private_key_bytes = match hex::decode(&transaction_req.private_key) {
        Ok(bytes) => bytes,
        Err(_) => return bad_request("Invalid private key format. Must be a hex string."),
    };

    let crypto = blockchain.crypto();
    let wallet = match crypto.wallet_from_secret_key(&private_key_bytes) {
        Ok(wallet) => wallet,
        Err(err) => return bad_request(format!("Invalid private key: {}", err)),
    };

    let mut transaction = Transaction::new(wallet.address().clone(), to_address, transaction_req.amount);

    if let Err(err) = transaction.sign(crypto, &wallet) {
        return bad_request(format!("Failed to sign transaction: {}", err));
    }

    match blockchain.add_transaction(transaction.clone()) {
        Ok(()) => HttpResponse::Created().json(TransactionResponse {
            message: "Transaction will be added to the next block".to_string(),
            transaction,
        }),
        Err(err) => bad_request(format!("Failed to add transaction: {}", err)),
    }
}

/// Mine a new block
///
/// Creates a new block with all pending transactions and a reward for the miner
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Invalid mining request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn mine_block(
    blockchain: BlockchainData,
    mine_req: web::Json<MineRequest>,
) -> impl Responder {
    let miner_address: Address = match mine_req.miner_address.parse() {
        Ok(address) => address,
        Err(err) => return bad_request(format!("Invalid miner address: {}", err)),
    };

    // Proof of work is CPU bound, keep it off the async workers
    let mined = web::block(move || blockchain.mine_pending_transactions(&miner_address)).await;

    match mined {
        Ok(Ok(block)) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Mined".to_string(),
            block,
        }),
        Ok(Err(err @ BlockchainError::MiningCancelled)) => {
            HttpResponse::InternalServerError().json(ErrorResponse::new(err.to_string()))
        }
        Ok(Err(err)) => bad_request(format!("Failed to mine block: {}", err)),
        Err(err) => {
            error!("Mining task failed: {}", err);
            HttpResponse::InternalServerError().json(ErrorResponse::new("Mining task failed"))
        }
    }
}

/// Check if the blockchain is valid
///
/// Validates the entire blockchain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    let is_valid = blockchain.is_chain_valid();
    HttpResponse::Ok().json(is_valid)
}

/// Create a new wallet
///
/// Creates a new wallet with a random keypair
///
/// The private key must be stored by your own
#[utoipa::path(
    post,
    path = "/api/v1/wallet/new",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet(blockchain: BlockchainData) -> impl Responder {
    let wallet = blockchain.crypto().generate_wallet();

    HttpResponse::Created().json(WalletResponse {
        address: wallet.address().0.clone(),
        private_key: hex::encode(wallet.export_secret_key()),
    })
}

/// Get a wallet's balance and history
#[utoipa::path(
    get,
    path = "/api/v1/wallet/{address}",
    params(
        ("address" = String, Path, description = "Wallet address")
    ),
    responses(
        (status = 200, description = "Wallet retrieved successfully", body = WalletInfoResponse)
    )
)]
pub async fn get_wallet(blockchain: BlockchainData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());

    HttpResponse::Ok().json(WalletInfoResponse {
        balance: blockchain.get_balance_of(&address),
        transactions: blockchain.get_transactions_of(&address),
        address: address.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::config::LedgerConfig;
    use actix_web::{http::StatusCode, test, App};

    fn test_data() -> BlockchainData {
        web::Data::new(Blockchain::with_config(LedgerConfig {
            difficulty: 1,
            mining_reward: 100.0,
        }))
    }

    #[actix_web::test]
    async fn test_get_chain() {
        let app = test::init_service(App::new().app_data(test_data()).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/api/v1/chain").to_request();
        let resp: ChainResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(resp.length, 1);
        assert!(resp.is_valid);
    }

    #[actix_web::test]
    async fn test_wallet_transfer_and_mine() {
        let data = test_data();
        let app = test::init_service(App::new().app_data(data.clone()).configure(configure_routes)).await;

        let req = test::TestRequest::post().uri("/api/v1/wallet/new").to_request();
        let sender: WalletResponse = test::call_and_read_body_json(&app, req).await;
        let req = test::TestRequest::post().uri("/api/v1/wallet/new").to_request();
        let recipient: WalletResponse = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/mine")
            .set_json(MineRequest {
                miner_address: sender.address.clone(),
            })
            .to_request();
        let mined: MineResponse = test::call_and_read_body_json(&app, req).await;
        assert!(mined.block.hash.starts_with('0'));

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(TransactionRequest {
                to_address: recipient.address.clone(),
                amount: 30.0,
                private_key: sender.private_key.clone(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(data.get_pending_transactions().len(), 1);

        let req = test::TestRequest::post()
            .uri("/api/v1/mine")
            .set_json(MineRequest {
                miner_address: sender.address.clone(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/wallet/{}", sender.address))
            .to_request();
        let wallet: WalletInfoResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(wallet.balance, 170.0);
        assert_eq!(wallet.transactions.len(), 3);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/wallet/{}", recipient.address))
            .to_request();
        let wallet: WalletInfoResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(wallet.balance, 30.0);

        let req = test::TestRequest::get().uri("/api/v1/validate").to_request();
        let valid: bool = test::call_and_read_body_json(&app, req).await;
        assert!(valid);
    }

    #[actix_web::test]
    async fn test_rejects_bad_requests() {
        let app = test::init_service(App::new().app_data(test_data()).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/mine")
            .set_json(MineRequest {
                miner_address: "not-an-address".to_string(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post().uri("/api/v1/wallet/new").to_request();
        let wallet: WalletResponse = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(TransactionRequest {
                to_address: wallet.address.clone(),
                amount: 1.0,
                private_key: "xyz".to_string(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(TransactionRequest {
                to_address: wallet.address.clone(),
                amount: -1.0,
                private_key: wallet.private_key.clone(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/v1/transactions/pending").to_request();
        let pending: Vec<Transaction> = test::call_and_read_body_json(&app, req).await;
        assert!(pending.is_empty());
    }
}
