//! Upload page

use axum::response::Html;

use tumorscan::report::render_upload_page;

/// GET / - Upload form with the model selector
pub async fn index() -> Html<String> {
    Html(render_upload_page(None))
}
