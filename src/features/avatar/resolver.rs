use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::ChainConfig;
use crate::error::AppError;

use super::types::{CollectionId, Layer, NetworkId, TokenId};

/// 链上数据协作方：给出 token 的有序图层列表（从底到顶）。
#[async_trait]
pub trait BundleResolver: Send + Sync {
    async fn resolve(
        &self,
        network: NetworkId,
        collection_id: CollectionId,
        token_id: TokenId,
    ) -> Result<Vec<Layer>, AppError>;
}

/// 基于 Unique Network REST API 的实现
pub struct UniqueRestResolver {
    client: Client,
    chain: ChainConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenImage {
    #[serde(default)]
    full_url: Option<String>,
    #[serde(default)]
    ipfs_cid: Option<String>,
}

/// `/tokens/bundle` 返回的嵌套 token 树
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleNode {
    collection_id: u32,
    token_id: u32,
    #[serde(default)]
    image: Option<TokenImage>,
    #[serde(default)]
    nesting_child_tokens: Vec<BundleNode>,
}

impl UniqueRestResolver {
    pub fn new(client: Client, chain: ChainConfig) -> Self {
        Self { client, chain }
    }

    fn bundle_url(&self, network: NetworkId) -> String {
        format!(
            "{}/tokens/bundle",
            self.chain.endpoints.base_url(network).trim_end_matches('/')
        )
    }
}

#[async_trait]
impl BundleResolver for UniqueRestResolver {
    async fn resolve(
        &self,
        network: NetworkId,
        collection_id: CollectionId,
        token_id: TokenId,
    ) -> Result<Vec<Layer>, AppError> {
        let url = self.bundle_url(network);
        tracing::debug!(%url, %collection_id, %token_id, "查询 token bundle");

        let resp = self
            .client
            .get(&url)
            .query(&[("collectionId", collection_id.0), ("tokenId", token_id.0)])
            .send()
            .await
            .map_err(|e| AppError::Resolution(format!("Chain request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Resolution(format!("{status}: {body}")));
        }

        let root: BundleNode = resp
            .json()
            .await
            .map_err(|e| AppError::Resolution(format!("Malformed bundle response: {e}")))?;

        let layers = flatten_bundle(&root, &self.chain.ipfs_gateway);
        if layers.is_empty() {
            return Err(AppError::Resolution(format!(
                "Token {collection_id}/{token_id} on {network} has no image layers"
            )));
        }
        Ok(layers)
    }
}

/// 先序遍历：父 token 在底层，子 token 按返回顺序叠在其上。
fn flatten_bundle(root: &BundleNode, ipfs_gateway: &str) -> Vec<Layer> {
    let mut layers = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(url) = node
            .image
            .as_ref()
            .and_then(|img| image_url(img, ipfs_gateway))
        {
            layers.push(Layer {
                collection_id: node.collection_id,
                token_id: node.token_id,
                image_url: url,
            });
        }
        stack.extend(node.nesting_child_tokens.iter().rev());
    }
    layers
}

fn image_url(image: &TokenImage, ipfs_gateway: &str) -> Option<String> {
    if let Some(url) = image.full_url.as_deref().filter(|u| !u.is_empty()) {
        return Some(url.to_string());
    }
    image
        .ipfs_cid
        .as_deref()
        .filter(|cid| !cid.is_empty())
        .map(|cid| format!("{}/{}", ipfs_gateway.trim_end_matches('/'), cid))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY: &str = "https://ipfs.example/ipfs/";

    fn parse(json: &str) -> BundleNode {
        serde_json::from_str(json).expect("parse bundle json")
    }

    #[test]
    fn single_token_yields_one_layer() {
        let root = parse(
            r#"{"collectionId": 5, "tokenId": 9, "image": {"fullUrl": "https://img/5-9.png"}}"#,
        );
        assert_eq!(
            flatten_bundle(&root, GATEWAY),
            vec![Layer {
                collection_id: 5,
                token_id: 9,
                image_url: "https://img/5-9.png".into(),
            }]
        );
    }

    #[test]
    fn bundle_is_flattened_parent_first_in_child_order() {
        let root = parse(
            r#"{
                "collectionId": 1, "tokenId": 1, "image": {"fullUrl": "https://img/base.png"},
                "nestingChildTokens": [
                    {"collectionId": 2, "tokenId": 1, "image": {"fullUrl": "https://img/hat.png"},
                     "nestingChildTokens": [
                        {"collectionId": 3, "tokenId": 1, "image": {"ipfsCid": "QmFeather"}}
                     ]},
                    {"collectionId": 2, "tokenId": 2, "image": {"fullUrl": "https://img/glasses.png"}}
                ]
            }"#,
        );
        let urls: Vec<String> = flatten_bundle(&root, GATEWAY)
            .into_iter()
            .map(|l| l.image_url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://img/base.png",
                "https://img/hat.png",
                "https://ipfs.example/ipfs/QmFeather",
                "https://img/glasses.png",
            ]
        );
    }

    #[test]
    fn tokens_without_image_are_skipped() {
        let root = parse(
            r#"{"collectionId": 1, "tokenId": 1, "image": {"fullUrl": ""},
                "nestingChildTokens": [{"collectionId": 2, "tokenId": 3}]}"#,
        );
        assert!(flatten_bundle(&root, GATEWAY).is_empty());
    }

    /// 本地单次 HTTP 响应，返回监听地址与收到的请求行
    async fn serve_once(
        status: &'static str,
        body: String,
    ) -> (std::net::SocketAddr, tokio::sync::oneshot::Receiver<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind tcp listener");
        let addr = listener.local_addr().expect("local addr");
        let (line_tx, line_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                let _ = line_tx.send(request.lines().next().unwrap_or_default().to_string());
                let resp = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(resp.as_bytes()).await;
            }
        });
        (addr, line_rx)
    }

    fn resolver_for(addr: std::net::SocketAddr) -> UniqueRestResolver {
        let mut chain = ChainConfig::default();
        chain.endpoints.opal = format!("http://{addr}/opal/v1/");
        chain.ipfs_gateway = GATEWAY.to_string();
        UniqueRestResolver::new(Client::new(), chain)
    }

    #[tokio::test]
    async fn non_success_status_becomes_resolution_error() {
        let (addr, _line) = serve_once("404 Not Found", "token not found".to_string()).await;

        let err = resolver_for(addr)
            .resolve(NetworkId::Opal, CollectionId(1), TokenId(2))
            .await
            .expect_err("expected resolution error");
        assert_eq!(
            err,
            AppError::Resolution("404 Not Found: token not found".into())
        );
    }

    #[tokio::test]
    async fn bundle_response_is_queried_and_flattened() {
        let body = r#"{
            "collectionId": 7, "tokenId": 3, "image": {"ipfsCid": "QmBase"},
            "nestingChildTokens": [
                {"collectionId": 8, "tokenId": 1, "image": {"fullUrl": "https://img/hat.png"}}
            ]
        }"#;
        let (addr, line) = serve_once("200 OK", body.to_string()).await;

        let layers = resolver_for(addr)
            .resolve(NetworkId::Opal, CollectionId(7), TokenId(3))
            .await
            .expect("resolve");
        assert_eq!(
            layers,
            vec![
                Layer {
                    collection_id: 7,
                    token_id: 3,
                    image_url: "https://ipfs.example/ipfs/QmBase".into(),
                },
                Layer {
                    collection_id: 8,
                    token_id: 1,
                    image_url: "https://img/hat.png".into(),
                },
            ]
        );
        assert_eq!(
            line.await.expect("request line"),
            "GET /opal/v1/tokens/bundle?collectionId=7&tokenId=3 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn bundle_without_images_is_resolution_error() {
        let body = r#"{"collectionId": 7, "tokenId": 3, "nestingChildTokens": []}"#;
        let (addr, _line) = serve_once("200 OK", body.to_string()).await;

        let err = resolver_for(addr)
            .resolve(NetworkId::Opal, CollectionId(7), TokenId(3))
            .await
            .expect_err("expected resolution error");
        assert_eq!(
            err,
            AppError::Resolution("Token 7/3 on opal has no image layers".into())
        );
    }

    #[tokio::test]
    async fn malformed_body_is_resolution_error() {
        let (addr, _line) = serve_once("200 OK", "not json".to_string()).await;

        let err = resolver_for(addr)
            .resolve(NetworkId::Opal, CollectionId(7), TokenId(3))
            .await
            .expect_err("expected resolution error");
        assert!(matches!(err, AppError::Resolution(m) if m.starts_with("Malformed bundle response")));
    }
}
