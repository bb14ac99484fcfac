use crate::error::AppError;

use super::types::{AvatarPathParams, AvatarRequest, AvatarStyle, CollectionId, NetworkId, TokenId};

/// 校验并解析路径参数。
///
/// 顺序：avatar → network → collectionId → tokenId，遇到第一个错误即返回。
pub fn validate(raw: &AvatarPathParams) -> Result<AvatarRequest, AppError> {
    let avatar: AvatarStyle = raw.avatar.parse().map_err(|_| {
        let allowed: Vec<&str> = AvatarStyle::ALL.iter().map(|s| s.as_str()).collect();
        AppError::invalid_parameter(
            "avatar",
            &raw.avatar,
            format!(
                "Unknown avatar ({}). Please use one of [{}]",
                raw.avatar,
                allowed.join(",")
            ),
        )
    })?;

    let network: NetworkId = raw.network.parse().map_err(|_| {
        let allowed: Vec<&str> = NetworkId::ALL.iter().map(|n| n.as_str()).collect();
        AppError::invalid_parameter(
            "network",
            &raw.network,
            format!(
                "Unknown network {}. Please use one of {}",
                raw.network,
                allowed.join(", ")
            ),
        )
    })?;

    let collection_id = parse_decimal(&raw.collection_id)
        .and_then(collection_id_from)
        .ok_or_else(|| {
            AppError::invalid_parameter(
                "collectionId",
                &raw.collection_id,
                format!("Invalid collectionId {}", raw.collection_id),
            )
        })?;

    let token_id = parse_decimal(&raw.token_id)
        .and_then(token_id_from)
        .ok_or_else(|| {
            AppError::invalid_parameter(
                "tokenId",
                &raw.token_id,
                format!("Invalid tokenId {}", raw.token_id),
            )
        })?;

    Ok(AvatarRequest {
        avatar,
        network,
        collection_id,
        token_id,
    })
}

/// 严格十进制：只接受 ASCII 数字（不接受符号、空白、小数点）。
fn parse_decimal(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// 集合 ID 0 保留不用
fn collection_id_from(n: u64) -> Option<CollectionId> {
    u32::try_from(n)
        .ok()
        .filter(|&id| id > 0)
        .map(CollectionId)
}

fn token_id_from(n: u64) -> Option<TokenId> {
    u32::try_from(n).ok().map(TokenId)
}
