//! `fetch`-backed implementations of the persistence and byte-source seams.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Headers, Request, RequestInit, RequestMode, Response};

use pagemark_shared::{NoteUpdate, PageKey, ProgressPatch, ReadingEntry, StickyNote, Stroke};

use crate::error::ApiError;
use crate::loader::ByteFetcher;
use crate::persistence::{AnnotationApi, ApiResult, Reader};

const USER_HEADER: &str = "x-user-id";

fn js_error(value: JsValue) -> ApiError {
    ApiError::Network(value.as_string().unwrap_or_else(|| format!("{value:?}")))
}

/// Path segments are user-supplied ids.
fn segment(value: &str) -> String {
    js_sys::encode_uri_component(value).into()
}

async fn send(
    method: &str,
    url: &str,
    user_id: Option<&str>,
    body: Option<String>,
) -> ApiResult<Response> {
    let window = web_sys::window().ok_or_else(|| ApiError::Network("no window".into()))?;
    let init = RequestInit::new();
    init.set_method(method);
    init.set_mode(RequestMode::SameOrigin);
    let headers = Headers::new().map_err(js_error)?;
    if let Some(user_id) = user_id {
        headers.set(USER_HEADER, user_id).map_err(js_error)?;
    }
    if let Some(body) = body {
        headers
            .set("content-type", "application/json")
            .map_err(js_error)?;
        init.set_body(&JsValue::from_str(&body));
    }
    init.set_headers(&headers);
    let request = Request::new_with_str_and_init(url, &init).map_err(js_error)?;
    let response: Response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(js_error)?
        .dyn_into()
        .map_err(|_| ApiError::Decode("not a Response".into()))?;
    Ok(response)
}

fn expect_ok(response: Response) -> ApiResult<Response> {
    if response.ok() {
        Ok(response)
    } else {
        Err(ApiError::Status(response.status()))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let promise = response
        .text()
        .map_err(|_| ApiError::Decode("body already used".into()))?;
    let text = JsFuture::from(promise)
        .await
        .map_err(js_error)?
        .as_string()
        .unwrap_or_default();
    serde_json::from_str(&text).map_err(|error| ApiError::Decode(error.to_string()))
}

fn to_body<T: Serialize>(value: &T) -> ApiResult<String> {
    serde_json::to_string(value).map_err(|error| ApiError::Decode(error.to_string()))
}

/// Talks to the annotation service under `api_base`.
pub struct HttpApi {
    api_base: String,
}

impl HttpApi {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }

    fn strokes_url(&self, key: &PageKey) -> String {
        format!(
            "{}/documents/{}/pages/{}/strokes",
            self.api_base,
            segment(&key.document_id),
            key.page
        )
    }

    fn notes_url(&self, reader: &Reader) -> String {
        format!("{}/documents/{}/notes", self.api_base, segment(&reader.document_id))
    }

    fn note_url(&self, reader: &Reader, id: &str) -> String {
        format!("{}/{}", self.notes_url(reader), segment(id))
    }

    fn reading_url(&self, reader: &Reader) -> String {
        format!("{}/reading-list/{}", self.api_base, segment(&reader.document_id))
    }
}

#[async_trait(?Send)]
impl AnnotationApi for HttpApi {
    async fn list_strokes(&self, key: &PageKey) -> ApiResult<Vec<Stroke>> {
        let response = send("GET", &self.strokes_url(key), Some(&key.user_id), None).await?;
        read_json(expect_ok(response)?).await
    }

    async fn insert_stroke(&self, key: &PageKey, stroke: &Stroke) -> ApiResult<()> {
        let body = to_body(stroke)?;
        let response = send("POST", &self.strokes_url(key), Some(&key.user_id), Some(body)).await?;
        expect_ok(response).map(|_| ())
    }

    async fn delete_strokes(&self, key: &PageKey) -> ApiResult<()> {
        let response = send("DELETE", &self.strokes_url(key), Some(&key.user_id), None).await?;
        expect_ok(response).map(|_| ())
    }

    async fn list_notes(&self, reader: &Reader) -> ApiResult<Vec<StickyNote>> {
        let response = send("GET", &self.notes_url(reader), Some(&reader.user_id), None).await?;
        read_json(expect_ok(response)?).await
    }

    async fn insert_note(&self, reader: &Reader, note: &StickyNote) -> ApiResult<()> {
        let body = to_body(note)?;
        let response =
            send("POST", &self.notes_url(reader), Some(&reader.user_id), Some(body)).await?;
        expect_ok(response).map(|_| ())
    }

    async fn update_note(&self, reader: &Reader, id: &str, update: &NoteUpdate) -> ApiResult<()> {
        let body = to_body(update)?;
        let response =
            send("PATCH", &self.note_url(reader, id), Some(&reader.user_id), Some(body)).await?;
        expect_ok(response).map(|_| ())
    }

    async fn delete_note(&self, reader: &Reader, id: &str) -> ApiResult<()> {
        let response =
            send("DELETE", &self.note_url(reader, id), Some(&reader.user_id), None).await?;
        expect_ok(response).map(|_| ())
    }

    async fn read_progress(&self, reader: &Reader) -> ApiResult<Option<ReadingEntry>> {
        let response = send("GET", &self.reading_url(reader), Some(&reader.user_id), None).await?;
        if response.status() == 404 {
            return Ok(None);
        }
        read_json(expect_ok(response)?).await.map(Some)
    }

    async fn patch_progress(&self, reader: &Reader, patch: &ProgressPatch) -> ApiResult<()> {
        let body = to_body(patch)?;
        let url = format!("{}/progress", self.reading_url(reader));
        let response = send("PATCH", &url, Some(&reader.user_id), Some(body)).await?;
        expect_ok(response).map(|_| ())
    }
}

/// Downloads document bytes; cross-origin sources are allowed.
pub struct NetworkFetcher;

#[async_trait(?Send)]
impl ByteFetcher for NetworkFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let window = web_sys::window().ok_or_else(|| ApiError::Network("no window".into()))?;
        let init = RequestInit::new();
        init.set_method("GET");
        init.set_mode(RequestMode::Cors);
        let request = Request::new_with_str_and_init(url, &init).map_err(js_error)?;
        let response: Response = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(js_error)?
            .dyn_into()
            .map_err(|_| ApiError::Decode("not a Response".into()))?;
        let response = expect_ok(response)?;
        let buffer = JsFuture::from(response.array_buffer().map_err(js_error)?)
            .await
            .map_err(js_error)?;
        Ok(js_sys::Uint8Array::new(&buffer).to_vec())
    }
}
