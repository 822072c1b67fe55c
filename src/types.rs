use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Standard response wrapper.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Page of items from a paginated list endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Paginated<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub pages: u64,
}

/// Opaque document identifier. The server emits numbers, callers may hold
/// strings; both decode to the same value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for DocumentId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(value) => value.into(),
            RawId::Text(value) => value.into(),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Semantic,
    Vector,
    Keyword,
    Hybrid,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Vector => "vector",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Parameters of `GET /knowledge/search`.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub search_type: SearchType,
    pub limit: u32,
    pub min_score: f64,
    /// Extra filters sent as individual query parameters, e.g.
    /// `provider`, `category`, `source`.
    pub filters: BTreeMap<String, String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            search_type: SearchType::default(),
            limit: 10,
            min_score: 0.0,
            filters: BTreeMap::new(),
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub(crate) fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("query".to_owned(), self.query.clone()),
            ("search_type".to_owned(), self.search_type.as_str().to_owned()),
            ("limit".to_owned(), self.limit.to_string()),
            ("min_score".to_owned(), self.min_score.to_string()),
        ];
        pairs.extend(
            self.filters
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        pairs
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SearchResult {
    pub id: DocumentId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: Option<JsonMap>,
    #[serde(default)]
    pub highlight: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub search_type: String,
    /// Server-side processing time.
    #[serde(default)]
    pub processing_time: f64,
}

/// Body of `POST /knowledge/qa`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuestionRequest {
    pub question: String,
    pub context: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl QuestionRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: Vec::new(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AnswerSource {
    #[serde(default)]
    pub document: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub relevance: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QuestionResponse {
    pub answer: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<AnswerSource>,
    #[serde(default)]
    pub processing_time: f64,
}

/// Body of `POST /knowledge/summarize`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummarizeRequest {
    pub content: String,
    pub max_length: u32,
    pub style: String,
}

impl SummarizeRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            max_length: 200,
            style: "default".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SummarizeResponse {
    pub summary: String,
    #[serde(default)]
    pub original_length: u64,
    #[serde(default)]
    pub summary_length: u64,
    #[serde(default)]
    pub compression_ratio: f64,
}

/// Parameters of `GET /knowledge/recommend`.
#[derive(Clone, Debug, PartialEq)]
pub struct RecommendRequest {
    pub document_id: DocumentId,
    pub limit: u32,
    pub similarity_threshold: f64,
}

impl RecommendRequest {
    pub fn new(document_id: impl Into<DocumentId>) -> Self {
        Self {
            document_id: document_id.into(),
            limit: 5,
            similarity_threshold: 0.7,
        }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("document_id".to_owned(), self.document_id.to_string()),
            ("limit".to_owned(), self.limit.to_string()),
            (
                "similarity_threshold".to_owned(),
                self.similarity_threshold.to_string(),
            ),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RecommendResponse {
    #[serde(default)]
    pub recommendations: Vec<SearchResult>,
    #[serde(default)]
    pub base_document: Option<String>,
    #[serde(default)]
    pub processing_time: f64,
}

/// Share of indexed documents belonging to one cloud provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderShare {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub percentage: f64,
}

/// Vector store statistics reported under `vector_store`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreStats {
    #[serde(default)]
    pub total_documents: u64,
    #[serde(default)]
    pub total_chunks: u64,
    #[serde(default)]
    pub provider_distribution: BTreeMap<String, ProviderShare>,
    /// Fields this client does not model.
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Response of `GET /knowledge/stats`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct KnowledgeStats {
    #[serde(default)]
    pub vector_store: VectorStoreStats,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub last_updated: Option<f64>,
}

/// Response of `GET /admin/health`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(flatten)]
    pub details: JsonMap,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Response of `GET /admin/metrics`; the shape is server-defined.
pub type Metrics = JsonMap;

/// Response of `POST /admin/reindex`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ReindexResponse {
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub details: JsonMap,
}

/// Parameters of `GET /admin/documents`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListDocumentsRequest {
    pub page: u32,
    pub size: u32,
}

impl Default for ListDocumentsRequest {
    fn default() -> Self {
        Self { page: 1, size: 10 }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DocumentInfo {
    pub id: DocumentId,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub chunks: Option<u64>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Response of `POST /admin/documents/upload`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Response of `DELETE /admin/documents/{id}`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub deleted_chunks: Option<u64>,
}
