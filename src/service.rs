//! Typed operations over the knowledge and admin endpoints.
//!
//! Each operation maps its parameters to one request on [`ApiClient`];
//! caching and retrying are composed by the caller.

use std::path::Path;

use crate::{
    client::{MultipartForm, RequestDescriptor, RequestOptions},
    types::{
        DeleteResponse, DocumentId, DocumentInfo, HealthReport, KnowledgeStats,
        ListDocumentsRequest, Metrics, Paginated, QuestionRequest, QuestionResponse,
        RecommendRequest, RecommendResponse, ReindexResponse, SearchRequest, SearchResponse,
        SummarizeRequest, SummarizeResponse, UploadResponse,
    },
    ApiClient, ApiError, Result,
};

pub const PATH_SEARCH: &str = "/knowledge/search";
pub const PATH_QA: &str = "/knowledge/qa";
pub const PATH_SUMMARIZE: &str = "/knowledge/summarize";
pub const PATH_RECOMMEND: &str = "/knowledge/recommend";
pub const PATH_STATS: &str = "/knowledge/stats";
pub const PATH_HEALTH: &str = "/admin/health";
pub const PATH_METRICS: &str = "/admin/metrics";
pub const PATH_REINDEX: &str = "/admin/reindex";
pub const PATH_DOCUMENTS: &str = "/admin/documents";
pub const PATH_UPLOAD: &str = "/admin/documents/upload";

pub fn document_path(id: &DocumentId) -> String {
    format!("{PATH_DOCUMENTS}/{id}")
}

impl ApiClient {
    /// Search, question answering, summaries, recommendations and stats.
    pub fn knowledge(&self) -> KnowledgeService<'_> {
        KnowledgeService {
            client: self,
            options: RequestOptions::default(),
        }
    }

    /// Health, metrics, reindexing and document management.
    pub fn admin(&self) -> AdminService<'_> {
        AdminService {
            client: self,
            options: RequestOptions::default(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct KnowledgeService<'a> {
    client: &'a ApiClient,
    options: RequestOptions,
}

impl<'a> KnowledgeService<'a> {
    /// Applies `options` to every request issued through this handle.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let descriptor = RequestDescriptor::get(PATH_SEARCH).with_query(request.query_pairs());
        self.send(descriptor).await?.decode()
    }

    pub async fn ask_question(&self, request: &QuestionRequest) -> Result<QuestionResponse> {
        let descriptor = RequestDescriptor::post(PATH_QA).with_json(request)?;
        self.send(descriptor).await?.decode()
    }

    pub async fn summarize(&self, request: &SummarizeRequest) -> Result<SummarizeResponse> {
        let descriptor = RequestDescriptor::post(PATH_SUMMARIZE).with_json(request)?;
        self.send(descriptor).await?.decode()
    }

    pub async fn recommend(&self, request: &RecommendRequest) -> Result<RecommendResponse> {
        let descriptor = RequestDescriptor::get(PATH_RECOMMEND).with_query(request.query_pairs());
        self.send(descriptor).await?.decode()
    }

    pub async fn stats(&self) -> Result<KnowledgeStats> {
        self.send(RequestDescriptor::get(PATH_STATS)).await?.decode()
    }

    async fn send(&self, descriptor: RequestDescriptor) -> Result<crate::ResponseEnvelope> {
        self.client.send(descriptor.with_options(self.options)).await
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AdminService<'a> {
    client: &'a ApiClient,
    options: RequestOptions,
}

impl<'a> AdminService<'a> {
    /// Applies `options` to every request issued through this handle.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn health(&self) -> Result<HealthReport> {
        self.send(RequestDescriptor::get(PATH_HEALTH)).await?.decode()
    }

    pub async fn metrics(&self) -> Result<Metrics> {
        self.send(RequestDescriptor::get(PATH_METRICS)).await?.decode()
    }

    pub async fn reindex(&self) -> Result<ReindexResponse> {
        self.send(RequestDescriptor::post(PATH_REINDEX)).await?.decode()
    }

    pub async fn list_documents(
        &self,
        request: ListDocumentsRequest,
    ) -> Result<Paginated<DocumentInfo>> {
        let descriptor = RequestDescriptor::get(PATH_DOCUMENTS).with_query([
            ("page", request.page.to_string()),
            ("size", request.size.to_string()),
        ]);
        self.send(descriptor).await?.decode()
    }

    /// Uploads one document as `multipart/form-data`.
    pub async fn upload_document(&self, upload: UploadRequest) -> Result<UploadResponse> {
        let descriptor = RequestDescriptor::post(PATH_UPLOAD).with_multipart(upload.into_form());
        self.send(descriptor).await?.decode()
    }

    pub async fn delete_document(&self, id: &DocumentId) -> Result<DeleteResponse> {
        self.send(RequestDescriptor::delete(document_path(id)))
            .await?
            .decode()
    }

    async fn send(&self, descriptor: RequestDescriptor) -> Result<crate::ResponseEnvelope> {
        self.client.send(descriptor.with_options(self.options)).await
    }
}

/// File and metadata for [`AdminService::upload_document`].
#[derive(Clone, Debug, PartialEq)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
    pub provider: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    /// Path of the file inside an uploaded directory tree.
    pub relative_path: Option<String>,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            mime: None,
            provider: None,
            category: None,
            title: None,
            relative_path: None,
        }
    }

    /// Reads `path` from disk; the file name becomes the upload name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ApiError::Config(format!("no file name in '{}'", path.display())))?
            .to_owned();
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            ApiError::Config(format!("could not read '{}': {err}", path.display()))
        })?;
        Ok(Self::new(file_name, bytes))
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    fn into_form(self) -> MultipartForm {
        let mut form = MultipartForm::new().file("file", self.file_name, self.mime, self.bytes);
        for (name, value) in [
            ("provider", self.provider),
            ("category", self.category),
            ("title", self.title),
            ("relative_path", self.relative_path),
        ] {
            if let Some(value) = value {
                form = form.text(name, value);
            }
        }
        form
    }
}
