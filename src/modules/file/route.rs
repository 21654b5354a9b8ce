use actix_web::web;

use crate::modules::file::handle;
use crate::modules::file::repository::FileRepository;

/// Routes reached without a token.
pub fn public_api_configure<R>(cfg: &mut web::ServiceConfig)
where
    R: FileRepository + Send + Sync + 'static,
{
    cfg.service(
        web::resource("/files/{code}").route(web::get().to(handle::download_by_code::<R>)),
    );
}

pub fn configure<R>(cfg: &mut web::ServiceConfig)
where
    R: FileRepository + Send + Sync + 'static,
{
    cfg.service(
        web::scope("/users/files")
            .service(
                web::resource("")
                    .route(web::get().to(handle::list_files::<R>))
                    .route(web::post().to(handle::upload_file::<R>)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(handle::get_file::<R>))
                    .route(web::put().to(handle::replace_file::<R>))
                    .route(web::delete().to(handle::delete_file::<R>)),
            )
            .service(
                web::resource("/{id}/content").route(web::get().to(handle::download_file::<R>)),
            ),
    );
}
