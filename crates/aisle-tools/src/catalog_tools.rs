//! `fetch_products`: product deals read from a JSON catalog file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::registry::{RegistryError, ToolDescriptor, ToolError, ToolRegistry};

pub const FETCH_PRODUCTS_TOOL: &str = "fetch_products";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `ProductDeal` describing one catalog entry.
pub struct ProductDeal {
    pub id: u64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub deal: String,
}

#[derive(Debug, Clone)]
/// Public struct `ProductCatalog` backed by a JSON array on disk.
pub struct ProductCatalog {
    path: PathBuf,
}

impl ProductCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file on every call so catalog edits show up without a restart.
    pub async fn load(&self) -> Result<Vec<ProductDeal>, ToolError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|error| {
            warn!(path = %self.path.display(), %error, "failed to read product catalog");
            ToolError::Failed(format!(
                "failed to read product catalog {}: {error}",
                self.path.display()
            ))
        })?;
        let products: Vec<ProductDeal> = serde_json::from_str(&raw).map_err(|error| {
            warn!(path = %self.path.display(), %error, "failed to parse product catalog");
            ToolError::Failed(format!(
                "failed to parse product catalog {}: {error}",
                self.path.display()
            ))
        })?;
        debug!(count = products.len(), "loaded product catalog");
        Ok(products)
    }

    pub async fn fetch_products(&self) -> Result<Value, ToolError> {
        let products = self.load().await?;
        Ok(json!({ "products": products }))
    }

    pub fn descriptor(self) -> ToolDescriptor {
        let catalog = Arc::new(self);
        ToolDescriptor::new(
            FETCH_PRODUCTS_TOOL,
            "Retrieve a list of product deal data",
            json!({"type": "object", "properties": {}}),
            move |_arguments: Value| {
                let catalog = Arc::clone(&catalog);
                async move { catalog.fetch_products().await }
            },
        )
    }
}

/// Registry holding only the catalog tool.
pub fn products_registry(path: impl Into<PathBuf>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(ProductCatalog::new(path).descriptor())?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::{products_registry, ProductCatalog, FETCH_PRODUCTS_TOOL};
    use crate::jsonrpc::{ErrorCode, RpcRequest};

    const THREE_DEALS: &str = r#"[
        {"id": 1, "name": "Trail Runner", "category": "Shoes", "price": 89.99, "deal": "20% off"},
        {"id": 2, "name": "Rain Shell", "category": "Jackets", "price": 129.0, "deal": "Free shipping"},
        {"id": 3, "name": "Wool Socks", "category": "Accessories", "price": 14.5, "deal": "Buy 2 get 1"}
    ]"#;

    #[tokio::test]
    async fn functional_fetch_products_returns_every_catalog_entry() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("products.json");
        std::fs::write(&path, THREE_DEALS).expect("write catalog");

        let registry = products_registry(&path).expect("registry");
        let result = registry
            .handle(&RpcRequest::new(1_i64, FETCH_PRODUCTS_TOOL, json!({})))
            .await
            .into_result()
            .expect("fetch_products succeeds");

        let products = result["products"].as_array().expect("products array");
        assert_eq!(products.len(), 3);
        assert_eq!(products[0]["name"], "Trail Runner");
        assert_eq!(products[1]["deal"], "Free shipping");
        assert_eq!(products[2]["id"], 3);
    }

    #[tokio::test]
    async fn regression_missing_catalog_file_is_internal_error() {
        let temp = tempdir().expect("tempdir");
        let registry = products_registry(temp.path().join("absent.json")).expect("registry");

        let error = registry
            .handle(&RpcRequest::new(1_i64, FETCH_PRODUCTS_TOOL, json!({})))
            .await
            .into_result()
            .expect_err("missing file fails");
        assert_eq!(error.code, ErrorCode::InternalError);
        assert!(error
            .data
            .and_then(|data| data.as_str().map(str::to_string))
            .unwrap_or_default()
            .contains("failed to read product catalog"));
    }

    #[tokio::test]
    async fn unit_malformed_catalog_reports_parse_failure() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("products.json");
        std::fs::write(&path, r#"[{"id": "one"}]"#).expect("write catalog");

        let error = ProductCatalog::new(&path)
            .load()
            .await
            .expect_err("malformed entry");
        assert!(error.to_string().contains("failed to parse product catalog"));
    }
}
