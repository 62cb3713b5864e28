// src/sources/fixture.rs
//! Static in-memory source for tests and dry runs: hands out a fixed set of
//! raw items on every fetch.

use async_trait::async_trait;

use crate::model::RawItem;
use crate::sources::{SourceError, TrendSource};

pub struct StaticSource {
    name: &'static str,
    items: Vec<RawItem>,
}

impl StaticSource {
    pub fn new(name: &'static str, items: Vec<RawItem>) -> Self {
        Self { name, items }
    }
}

#[async_trait]
impl TrendSource for StaticSource {
    async fn fetch(&self, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
