use bech32::{FromBase32, Variant};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};

/// The bech32 human readable part used by Secret Network accounts and
/// contracts.
pub const ADDRESS_PREFIX: &str = "secret";

/// Checks that `address` is a bech32 address with the given human readable
/// part and a 20 or 32 byte payload.
pub fn validate_address(address: &str, prefix: &str) -> Result<()> {
    let (hrp, data, variant) =
        bech32::decode(address).map_err(|e| eyre!("invalid bech32 address {:?}: {}", address, e))?;
    if hrp != prefix {
        return Err(eyre!(
            "address {} has prefix {:?}, expected {:?}",
            address,
            hrp,
            prefix
        ));
    }
    if variant != Variant::Bech32 {
        return Err(eyre!("address {} is bech32m encoded", address));
    }
    let payload = Vec::<u8>::from_base32(&data)?;
    if payload.len() != 20 && payload.len() != 32 {
        return Err(eyre!(
            "address {} has a {} byte payload",
            address,
            payload.len()
        ));
    }
    Ok(())
}

/// Checks that `code_hash` is a 32 byte hex string. Both cases are accepted
/// since the chain compares hashes case-insensitively.
pub fn validate_code_hash(code_hash: &str) -> Result<()> {
    if code_hash.len() != 64 {
        return Err(eyre!(
            "code hash {:?} has {} characters, expected 64",
            code_hash,
            code_hash.len()
        ));
    }
    match hex::decode(code_hash) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        _ => Err(eyre!("code hash {:?} is not valid hex", code_hash)),
    }
}

/// An uploaded contract template that hasn't been instantiated.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractReference {
    pub code_id: u64,
    pub code_hash: String,
}

impl ContractReference {
    pub fn new(code_id: u64, code_hash: impl Into<String>) -> Result<Self> {
        let code_hash = code_hash.into();
        validate_code_hash(&code_hash)?;
        Ok(Self { code_id, code_hash })
    }
}

/// Everything needed to talk to an instantiated contract.
#[derive(Default, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractLink {
    pub address: String,
    pub code_hash: String,
}

impl ContractLink {
    pub fn new(address: impl Into<String>, code_hash: impl Into<String>) -> Result<Self> {
        let (address, code_hash) = (address.into(), code_hash.into());
        validate_address(&address, ADDRESS_PREFIX)?;
        validate_code_hash(&code_hash)?;
        Ok(Self { address, code_hash })
    }
}

/// A deployed SNIP-20 token.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDescriptor {
    pub name: String,
    pub address: String,
    pub code_hash: String,
}

impl TokenDescriptor {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        code_hash: impl Into<String>,
    ) -> Result<Self> {
        let token = Self {
            name: name.into(),
            address: address.into(),
            code_hash: code_hash.into(),
        };
        token.validate()?;
        Ok(token)
    }

    /// Tokens are usually loaded from static configuration, so this is
    /// exposed separately from the constructor.
    pub fn validate(&self) -> Result<()> {
        validate_address(&self.address, ADDRESS_PREFIX)?;
        validate_code_hash(&self.code_hash)
    }

    pub fn link(&self) -> ContractLink {
        ContractLink {
            address: self.address.clone(),
            code_hash: self.code_hash.clone(),
        }
    }
}

/// A pair the factory reported after the deployment.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PairAddresses {
    pub assets: [String; 2],
    pub contract_addr: String,
    pub liquidity_token: String,
}

/// The artifacts of a deployment run.
#[derive(Default, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Addresses {
    pub factory: ContractLink,
    /// False when the run resumed against an existing factory.
    pub factory_created: bool,
    #[serde(default)]
    pub pairs: Vec<PairAddresses>,
}

#[cfg(test)]
mod tests {
    use eyre::Result;

    use super::*;

    const SSCRT: &str = "secret1k0jntykt7e4g3y88ltc60czgjuqdy4c9e8fzek";
    const SSCRT_HASH: &str = "af74387e276be8874f07bec3a87023ee49b0e7ebe08178c49d0a49c3c98ed60e";

    #[test]
    fn test_validate_address() -> Result<()> {
        validate_address(SSCRT, ADDRESS_PREFIX)?;

        // Wrong prefix.
        assert!(validate_address(SSCRT, "cosmos").is_err());

        // Broken checksum.
        let mut broken = SSCRT.to_string();
        broken.pop();
        broken.push('q');
        assert!(validate_address(&broken, ADDRESS_PREFIX).is_err());

        // Not bech32 at all.
        assert!(validate_address("", ADDRESS_PREFIX).is_err());
        assert!(validate_address("0x5FbDB2315678afecb367f032d93F642f64180aa3", ADDRESS_PREFIX).is_err());

        Ok(())
    }

    #[test]
    fn test_validate_code_hash() -> Result<()> {
        validate_code_hash(SSCRT_HASH)?;
        validate_code_hash(&SSCRT_HASH.to_uppercase())?;

        assert!(validate_code_hash(&SSCRT_HASH[1..]).is_err());
        assert!(validate_code_hash(&format!("0x{}", &SSCRT_HASH[2..])).is_err());
        assert!(validate_code_hash(&"z".repeat(64)).is_err());

        Ok(())
    }

    #[test]
    fn test_token_descriptor_json() -> Result<()> {
        let token: TokenDescriptor = serde_json::from_str(&format!(
            r#"{{"name": "sSCRT", "address": "{}", "codeHash": "{}"}}"#,
            SSCRT, SSCRT_HASH
        ))?;
        token.validate()?;
        assert_eq!(token, TokenDescriptor::new("sSCRT", SSCRT, SSCRT_HASH)?);
        assert_eq!(token.link(), ContractLink::new(SSCRT, SSCRT_HASH)?);
        Ok(())
    }
}
