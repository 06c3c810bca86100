//! Article search sources.
//!
//! The fetcher talks to a source through [`SearchApi`]: one call per
//! [`TopicQuery`], returning the raw records for that topic. Sources report
//! failures as errors; deciding that a failed topic contributes nothing is the
//! fetcher's job.
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | NewsAPI `everything` | [`newsapi`] | JSON search API, API key |

use crate::error::Result;
use crate::models::{RawArticle, TopicQuery};
use async_trait::async_trait;

pub mod newsapi;

/// Something that can search articles for one topic and date window.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, query: &TopicQuery) -> Result<Vec<RawArticle>>;
}
