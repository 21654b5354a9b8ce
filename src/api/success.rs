use actix_web::{http::StatusCode, HttpResponse};
use std::borrow::Cow;

#[derive(serde::Serialize)]
pub struct SuccessData<T: serde::Serialize> {
    pub data: Option<T>,
    pub message: Option<Cow<'static, str>>,
}

pub struct Success<T: serde::Serialize> {
    pub status: StatusCode,
    pub body: SuccessData<T>,
}

impl<T: serde::Serialize> Success<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self { status: StatusCode::OK, body: SuccessData { data, message: None } }
    }

    /// Upload and replace answer 202: the file is stored, its purge is still pending.
    pub fn accepted(data: Option<T>) -> Self {
        Self { status: StatusCode::ACCEPTED, body: SuccessData { data, message: None } }
    }

    pub fn message<M>(mut self, msg: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        self.body.message = Some(msg.into());
        self
    }
}

impl<T: serde::Serialize> actix_web::Responder for Success<T> {
    type Body = actix_web::body::BoxBody;

    fn respond_to(self, _req: &actix_web::HttpRequest) -> HttpResponse<Self::Body> {
        HttpResponse::build(self.status).json(self.body)
    }
}
