pub mod api;
pub mod chain;
pub mod config;
pub mod db;
pub mod decoder;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod retry;

pub use chain::{ChainClient, ChainError, LogFeed, MockChain, RpcChainClient, WsLogFeed};
pub use config::Config;
pub use db::{init_db, Repository};
pub use decoder::Decoder;
pub use domain::{
    Action, ActionKind, Catalog, PlayerAggregate, RawTransaction, TxSignature, UnixSecs, Wallet,
};
pub use error::AppError;
pub use ingest::{GapReconciler, LiveSubscriber, Pipeline};
