use std::collections::VecDeque;
use std::fmt;

use serde_json::Value;

use nftower_core::error::{Result, TowerError};

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query string parameters, in the order they are sent.
pub type Query<'a> = &'a [(&'a str, String)];

/// Authenticated access to the Tower control plane.
///
/// Responses are decoded JSON objects; a body that is not JSON decodes to `{}`.
pub trait Gateway {
    fn request(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<&Value>,
    ) -> Result<Value>;

    /// Lazily walk every item of a paginated listing.
    fn paged_request(&self, method: Method, path: &str, query: Query<'_>) -> Pages<'_>;
}

/// Iterator over the items of a paginated listing, fetching pages on demand.
///
/// Each page is expected to carry exactly one array field (the items) and,
/// usually, a `totalSize`. Iteration stops on an empty page, once `totalSize`
/// items were seen, or after a short page when the total is not reported.
pub struct Pages<'a> {
    gateway: &'a dyn Gateway,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    page_size: u64,
    offset: u64,
    buffer: VecDeque<Value>,
    exhausted: bool,
}

impl<'a> Pages<'a> {
    /// A `max` already present in `query` overrides `page_size`.
    pub fn new(
        gateway: &'a dyn Gateway,
        method: Method,
        path: &str,
        query: Query<'_>,
        page_size: u32,
    ) -> Self {
        let mut size = u64::from(page_size.max(1));
        let mut kept = Vec::with_capacity(query.len());
        for (key, value) in query {
            match *key {
                "max" => size = value.parse().unwrap_or(size).max(1),
                "offset" => {}
                _ => kept.push((key.to_string(), value.clone())),
            }
        }
        Self {
            gateway,
            method,
            path: path.to_string(),
            query: kept,
            page_size: size,
            offset: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let mut query: Vec<(&str, String)> = self
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        query.push(("max", self.page_size.to_string()));
        query.push(("offset", self.offset.to_string()));

        let page = self.gateway.request(self.method, &self.path, &query, None)?;
        let items = page_items(&page, &self.path)?;
        let count = items.len() as u64;
        self.offset += count;

        let total = page.get("totalSize").and_then(Value::as_u64);
        self.exhausted = match total {
            Some(total) => count == 0 || self.offset >= total,
            None => count < self.page_size,
        };
        self.buffer.extend(items);
        Ok(())
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

/// The items of one page: its only array-valued field.
fn page_items(page: &Value, path: &str) -> Result<Vec<Value>> {
    let Some(fields) = page.as_object() else {
        return Err(TowerError::UnexpectedResponse(format!(
            "page of {path} is not a JSON object"
        )));
    };
    if fields.is_empty() {
        return Ok(Vec::new());
    }
    let mut arrays = fields.values().filter_map(Value::as_array);
    match (arrays.next(), arrays.next()) {
        (Some(items), None) => Ok(items.clone()),
        (None, _) => Err(TowerError::UnexpectedResponse(format!(
            "page of {path} has no item list"
        ))),
        (Some(_), Some(_)) => Err(TowerError::UnexpectedResponse(format!(
            "page of {path} has more than one item list"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    /// Serves `total` numbered items and records every query it receives.
    struct Numbers {
        total: u64,
        report_total: bool,
        seen: RefCell<Vec<Vec<(String, String)>>>,
    }

    impl Gateway for Numbers {
        fn request(
            &self,
            _method: Method,
            _path: &str,
            query: Query<'_>,
            _body: Option<&Value>,
        ) -> Result<Value> {
            self.seen.borrow_mut().push(
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            );
            let get = |key: &str| -> u64 {
                query
                    .iter()
                    .find(|(k, _)| *k == key)
                    .and_then(|(_, v)| v.parse().ok())
                    .unwrap_or(0)
            };
            let (max, offset) = (get("max"), get("offset"));
            let items: Vec<Value> = (offset..self.total.min(offset + max))
                .map(|n| json!({ "id": n }))
                .collect();
            if self.report_total {
                Ok(json!({ "items": items, "totalSize": self.total }))
            } else {
                Ok(json!({ "items": items }))
            }
        }

        fn paged_request(&self, method: Method, path: &str, query: Query<'_>) -> Pages<'_> {
            Pages::new(self, method, path, query, 2)
        }
    }

    fn numbers(total: u64, report_total: bool) -> Numbers {
        Numbers {
            total,
            report_total,
            seen: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn test_pages_follow_total_size() {
        let gateway = numbers(5, true);
        let ids: Vec<u64> = gateway
            .paged_request(Method::Get, "/things", &[("workspaceId", "7".into())])
            .map(|item| item.unwrap()["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        let seen = gateway.seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[1],
            vec![
                ("workspaceId".to_string(), "7".to_string()),
                ("max".to_string(), "2".to_string()),
                ("offset".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_pages_stop_on_short_page_without_total() {
        let gateway = numbers(4, false);
        assert_eq!(gateway.paged_request(Method::Get, "/things", &[]).count(), 4);
        // Two full pages, then an empty one.
        assert_eq!(gateway.seen.borrow().len(), 3);
    }

    #[test]
    fn test_explicit_max_overrides_page_size() {
        let gateway = numbers(5, true);
        let count = gateway
            .paged_request(Method::Get, "/labels", &[("max", "1000".into())])
            .count();
        assert_eq!(count, 5);
        assert_eq!(gateway.seen.borrow().len(), 1);
    }

    #[test]
    fn test_pages_are_lazy() {
        let gateway = numbers(10, true);
        let first = gateway
            .paged_request(Method::Get, "/things", &[])
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(first["id"], 0);
        assert_eq!(gateway.seen.borrow().len(), 1);
    }

    #[test]
    fn test_page_items_shapes() {
        assert!(page_items(&json!({}), "/x").unwrap().is_empty());
        assert_eq!(page_items(&json!({"a": [1, 2], "totalSize": 2}), "/x").unwrap().len(), 2);
        assert!(page_items(&json!({"totalSize": 2}), "/x").is_err());
        assert!(page_items(&json!({"a": [], "b": []}), "/x").is_err());
        assert!(page_items(&json!([1]), "/x").is_err());
    }
}
