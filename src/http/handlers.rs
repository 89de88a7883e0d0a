//! Request handlers.

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;

use super::AppState;
use crate::database::{PostFields, Upload};
use crate::error::ServiceError;
use crate::services::PostResource;

/// Form fields shared by create and update.
#[derive(Debug, Default)]
struct PostForm {
    fields: PostFields,
    image: Option<Upload>,
}

impl PostForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ServiceError> {
        let mut form = PostForm::default();

        while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.fields.title = field.text().await.map_err(bad_form)?,
                "content" => form.fields.content = field.text().await.map_err(bad_form)?,
                "image" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await.map_err(bad_form)?;
                    // Browsers send an empty part when no file was picked.
                    if !bytes.is_empty() {
                        form.image = Some(Upload::new(file_name, bytes.to_vec()));
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

fn bad_form(e: axum::extract::multipart::MultipartError) -> ServiceError {
    ServiceError::Validation(format!("malformed form: {e}"))
}

pub async fn index(State(service): State<AppState>) -> Result<Json<Vec<PostResource>>, ServiceError> {
    Ok(Json(service.index().await?))
}

pub async fn show(
    State(service): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostResource>, ServiceError> {
    Ok(Json(service.show(id).await?))
}

pub async fn create(
    State(service): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PostResource>), ServiceError> {
    let form = PostForm::read(multipart).await?;
    let post = service.create(form.fields, form.image).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update(
    State(service): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<PostResource>, ServiceError> {
    let form = PostForm::read(multipart).await?;
    Ok(Json(service.update(id, form.fields, form.image).await?))
}

pub async fn destroy(
    State(service): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
