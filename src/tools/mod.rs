//! 工具层：data-query worker 使用的数据检索能力

pub mod ads_api;
pub mod query;

pub use ads_api::{DataSource, MockAdsApi, RetrievalError, Row};
pub use query::{QueryFilter, QueryObject, SortOrder, MAX_FILTERS, MAX_GROUP_BY, MAX_METRICS};
