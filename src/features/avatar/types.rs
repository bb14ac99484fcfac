use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 头像合成样式（封闭集合，决定画布遮罩）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AvatarStyle {
    /// 方形，不加遮罩
    Square,
    /// 圆形遮罩
    Circle,
    /// 圆角遮罩（半径为画布边长的 1/8）
    Rounded,
}

impl AvatarStyle {
    pub const ALL: [AvatarStyle; 3] = [AvatarStyle::Square, AvatarStyle::Circle, AvatarStyle::Rounded];

    pub fn as_str(&self) -> &'static str {
        match self {
            AvatarStyle::Square => "square",
            AvatarStyle::Circle => "circle",
            AvatarStyle::Rounded => "rounded",
        }
    }
}

impl fmt::Display for AvatarStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AvatarStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AvatarStyle::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or(())
    }
}

/// 支持的链（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Unique,
    Quartz,
    Opal,
    Sapphire,
}

impl NetworkId {
    pub const ALL: [NetworkId; 4] = [
        NetworkId::Unique,
        NetworkId::Quartz,
        NetworkId::Opal,
        NetworkId::Sapphire,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkId::Unique => "unique",
            NetworkId::Quartz => "quartz",
            NetworkId::Opal => "opal",
            NetworkId::Sapphire => "sapphire",
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NetworkId::ALL
            .into_iter()
            .find(|network| network.as_str() == s)
            .ok_or(())
    }
}

/// 集合 ID（合法范围 1..=u32::MAX）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(pub u32);

/// Token ID（合法范围 0..=u32::MAX）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 原始路径参数 `/{avatar}/{network}/{collectionId}/{tokenId}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarPathParams {
    pub avatar: String,
    pub network: String,
    pub collection_id: String,
    pub token_id: String,
}

impl AvatarPathParams {
    pub fn new(
        avatar: impl Into<String>,
        network: impl Into<String>,
        collection_id: impl Into<String>,
        token_id: impl Into<String>,
    ) -> Self {
        Self {
            avatar: avatar.into(),
            network: network.into(),
            collection_id: collection_id.into(),
            token_id: token_id.into(),
        }
    }
}

/// 校验通过的请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvatarRequest {
    pub avatar: AvatarStyle,
    pub network: NetworkId,
    pub collection_id: CollectionId,
    pub token_id: TokenId,
}

/// 组成头像的单个图层（按从底到顶的顺序排列）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub collection_id: u32,
    pub token_id: u32,
    pub image_url: String,
}
