use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::db::TodoItem;

use super::{PullCursor, RemoteStore, TodoItemDto};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn join_base_url_and_path(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn items_collection_path(owner_id: &str) -> String {
    format!("owners/{owner_id}/items")
}

#[derive(Debug, Serialize)]
struct BatchMergeWrite<'a> {
    id: &'a str,
    fields: TodoItemDto,
}

#[derive(Debug, Serialize)]
struct BatchMergeRequest<'a> {
    writes: Vec<BatchMergeWrite<'a>>,
}

#[derive(Debug, Deserialize)]
struct FetchDocument {
    id: String,
    fields: TodoItemDto,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    items: Vec<FetchDocument>,
}

// Document-store backend over a JSON HTTP API. One item is one document
// under `owners/{owner_id}/items/{item_id}`; `items:batchMerge` commits a
// batch atomically with shallow-merge write semantics.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: String, auth_token: Option<String>) -> Result<Self> {
        reqwest::Url::parse(&base_url).map_err(|_| anyhow!("invalid base_url"))?;
        Ok(Self {
            client: Client::new(),
            base_url,
            auth_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::blocking::RequestBuilder {
        let url = join_base_url_and_path(&self.base_url, path);
        let mut builder = self.client.request(method, url).timeout(REQUEST_TIMEOUT);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

impl RemoteStore for HttpRemoteStore {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn push_items(&self, owner_id: &str, items: &[TodoItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let writes = items
            .iter()
            .map(|item| BatchMergeWrite {
                id: &item.id,
                fields: TodoItemDto::from_item(item),
            })
            .collect();

        let path = format!("{}:batchMerge", items_collection_path(owner_id));
        let resp = self
            .request(Method::POST, &path)
            .json(&BatchMergeRequest { writes })
            .send()?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(anyhow!("batch merge failed: HTTP {status} {body}"));
        }
        Ok(())
    }

    fn fetch_updated_items(
        &self,
        owner_id: &str,
        cursor: &PullCursor,
        limit: usize,
    ) -> Result<Vec<TodoItem>> {
        let mut req = self
            .request(Method::GET, &items_collection_path(owner_id))
            .query(&[
                ("sinceMs", cursor.since_ms.to_string()),
                ("limit", limit.to_string()),
            ]);
        if let Some((after_ms, after_id)) = &cursor.after {
            req = req.query(&[
                ("afterMs", after_ms.to_string()),
                ("afterId", after_id.clone()),
            ]);
        }

        let resp = req.send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(anyhow!("fetch updated items failed: HTTP {status} {body}"));
        }

        let body: FetchResponse = resp.json()?;
        Ok(body
            .items
            .into_iter()
            .map(|doc| doc.fields.into_item(&doc.id, owner_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{items_collection_path, join_base_url_and_path};

    #[test]
    fn joins_base_url_without_duplicate_slashes() {
        assert_eq!(
            join_base_url_and_path("https://example.com/api/", "/owners/u1/items"),
            "https://example.com/api/owners/u1/items"
        );
        assert_eq!(
            join_base_url_and_path("https://example.com", "owners/u1/items"),
            "https://example.com/owners/u1/items"
        );
    }

    #[test]
    fn collection_path_is_owner_scoped() {
        assert_eq!(items_collection_path("u1"), "owners/u1/items");
    }
}
