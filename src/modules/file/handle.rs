use actix_multipart::Multipart;
use actix_web::{
    body::SizedStream,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web, HttpRequest, HttpResponse,
};
use futures_util::TryStreamExt;
use tokio_util::io::ReaderStream;

use crate::api::success::Success;
use crate::api::{error, success};
use crate::constants::MAX_FILE_SIZE;
use crate::middlewares::get_claims;
use crate::modules::file::model::validate_size;
use crate::modules::file::repository::FileRepository;
use crate::modules::file::schema::FileEntity;
use crate::modules::file::service::{Download, FileService};

/// Read the `file` field of a multipart body, refusing oversized uploads
/// before they are fully buffered.
async fn read_upload(mut payload: Multipart) -> Result<(String, Vec<u8>), error::Error> {
    while let Some(mut field) =
        payload.try_next().await.map_err(|e| error::Error::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .ok_or_else(|| error::Error::bad_request("Missing filename"))?
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|_| error::Error::InternalServer)? {
            validate_size(bytes.len() + chunk.len()).map_err(|_| {
                error::Error::bad_request(format!(
                    "File must not be more than {MAX_FILE_SIZE} bytes big"
                ))
            })?;
            bytes.extend_from_slice(&chunk);
        }

        return Ok((filename, bytes));
    }

    Err(error::Error::bad_request("No file found in request"))
}

fn download_response(download: Download) -> HttpResponse {
    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(download.name)],
    };

    HttpResponse::Ok()
        .insert_header(disposition)
        .content_type("application/octet-stream")
        .body(SizedStream::new(download.len, ReaderStream::new(download.file)))
}

pub async fn list_files<R>(
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<Vec<FileEntity>>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let owner_id = get_claims(&req)?.sub;
    let files = service.list_files(owner_id).await?;
    Ok(Success::ok(Some(files)))
}

pub async fn upload_file<R>(
    payload: Multipart,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<FileEntity>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let owner_id = get_claims(&req)?.sub;
    let (name, bytes) = read_upload(payload).await?;

    let file = service.upload_file(owner_id, name, bytes).await?;
    Ok(Success::accepted(Some(file)).message("File uploaded successfully"))
}

pub async fn get_file<R>(
    file_id: web::Path<i64>,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<FileEntity>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let owner_id = get_claims(&req)?.sub;
    let file = service.get_file(owner_id, file_id.into_inner()).await?;
    Ok(Success::ok(Some(file)))
}

pub async fn download_file<R>(
    file_id: web::Path<i64>,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<HttpResponse, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let owner_id = get_claims(&req)?.sub;
    let download = service.open_file(owner_id, file_id.into_inner()).await?;
    Ok(download_response(download))
}

pub async fn replace_file<R>(
    file_id: web::Path<i64>,
    payload: Multipart,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<FileEntity>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let owner_id = get_claims(&req)?.sub;
    let (name, bytes) = read_upload(payload).await?;

    let file = service.replace_file(owner_id, file_id.into_inner(), name, bytes).await?;
    Ok(Success::accepted(Some(file)).message("File replaced successfully"))
}

pub async fn delete_file<R>(
    file_id: web::Path<i64>,
    req: HttpRequest,
    service: web::Data<FileService<R>>,
) -> Result<success::Success<()>, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let owner_id = get_claims(&req)?.sub;
    service.delete_file(owner_id, file_id.into_inner()).await?;
    Ok(Success::ok(None).message("File successfully deleted"))
}

/// Public download by code; no authentication.
pub async fn download_by_code<R>(
    code: web::Path<String>,
    service: web::Data<FileService<R>>,
) -> Result<HttpResponse, error::Error>
where
    R: FileRepository + Send + Sync + 'static,
{
    let download = service.open_by_code(&code.into_inner()).await?;
    Ok(download_response(download))
}
