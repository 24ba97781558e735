use std::time::Duration;

use adamant_addresses::TokenDescriptor;

/// The label the factory's asset references carry. It is used for asset
/// resolution only and is not a secret.
pub const VIEWING_KEY: &str = "SecretSwap";

/// Mainnet contract templates.
pub const FACTORY_CODE_ID: u64 = 30;
pub const FACTORY_CODE_HASH: &str =
    "16ea6dca596d2e5e6eef41df6dc26a1368adaa238aa93f07959841e7968c51bd";
pub const PAIR_CODE_ID: u64 = 31;
pub const PAIR_CODE_HASH: &str =
    "0DFD06C7C3C482C14D36BA9826B83D164003F2B0BB302F222DB72361E0927490";
// Custom SNIP-20 that allows long names and '-' in symbols.
pub const TOKEN_CODE_ID: u64 = 2002;
pub const TOKEN_CODE_HASH: &str =
    "FFB0FDDE923856649E4394140F0210C43F744FB1D684BC46FD59C873EF0A79EC";

pub const SECRET_RPC_URL: &str = "https://rpc.ankr.com/http/scrt_cosmos";
pub const SECRET_CHAIN_ID: &str = "secret-4";

pub const FACTORY_GAS_LIMIT: u64 = 50_000;
pub const PAIRS_GAS_LIMIT: u64 = 2_000_000;
pub const GAS_PRICE: f64 = 0.1;
pub const FEE_DENOM: &str = "uscrt";
pub const BROADCAST_TIMEOUT: Duration = Duration::from_millis(300_000);
pub const COMMIT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

lazy_static! {
    // The tokens that get paired. The first token is the base asset of every
    // pair.
    pub static ref TOKENS: Vec<TokenDescriptor> = vec![
        token(
            "sSCRT",
            "secret1k0jntykt7e4g3y88ltc60czgjuqdy4c9e8fzek",
            "af74387e276be8874f07bec3a87023ee49b0e7ebe08178c49d0a49c3c98ed60e",
        ),
        token(
            "sATOM",
            "secret14mzwd0ps5q277l20ly2q3aetqe3ev4m4260gf4",
            "ad91060456344fc8d8e93c0600a3957b8158605c044b3bef7048510b3157b807",
        ),
        token(
            "SILK",
            "secret1fl449muk5yq8dlad7a22nje4p5d2pnsgymhjfd",
            "638a3e1d50175fbcb8373cf801565283e3eb23d88a9b7b7f99fcc5eb1e6b561e",
        ),
        token(
            "ETH.axl",
            "secret139qfh3nmuzfgwsx2npnmnjl4hrvj3xq5rmq8a0",
            "638a3e1d50175fbcb8373cf801565283e3eb23d88a9b7b7f99fcc5eb1e6b561e",
        ),
        token(
            "USDC.nbl",
            "secret1chsejpk9kfj4vt9ec6xvyguw539gsdtr775us2",
            "5a085bd8ed89de92b35134ddd12505a602c7759ea25fb5c089ba03c8535b3042",
        ),
        token(
            "JKL",
            "secret1sgaz455pmtgld6dequqayrdseq8vy2fc48n8y3",
            "638a3e1d50175fbcb8373cf801565283e3eb23d88a9b7b7f99fcc5eb1e6b561e",
        ),
    ];
}

fn token(name: &str, address: &str, code_hash: &str) -> TokenDescriptor {
    TokenDescriptor {
        name: name.to_string(),
        address: address.to_string(),
        code_hash: code_hash.to_string(),
    }
}
