//! Implementation of the actix server.

use actix_web::{
    get,
    http::StatusCode,
    middleware::Logger,
    post,
    web::{self, Data, Json},
    App, HttpResponse, HttpServer, Responder, ResponseError,
};
use serde::{Deserialize, Serialize};

use crate::err::LookupError;

use super::{Args, WebServerData};

/// Message shown to clients instead of internal data errors.
const DATA_ERROR_MESSAGE: &str = "Internal error while reading the data sources";

#[derive(Debug)]
struct CustomError {
    err: LookupError,
}

impl std::fmt::Display for CustomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl CustomError {
    fn new(err: LookupError) -> Self {
        if let LookupError::Data(msg) = &err {
            tracing::error!("data error: {}", msg);
        }
        CustomError { err }
    }

    fn message(&self) -> String {
        match &self.err {
            LookupError::Data(_) => DATA_ERROR_MESSAGE.to_string(),
            err => err.to_string(),
        }
    }
}

/// Body of error responses.
#[derive(Serialize, Debug)]
struct ErrorBody {
    message: String,
}

impl ResponseError for CustomError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            message: self.message(),
        })
    }
}

/// Body of "/api/v1/results".
#[derive(Deserialize, Debug)]
struct ResultsRequest {
    variants: String,
}

/// Run a variant or gene query.
#[post("/api/v1/results")]
async fn fetch_results(
    data: Data<WebServerData>,
    request: Json<ResultsRequest>,
) -> actix_web::Result<impl Responder, CustomError> {
    let query = request.into_inner().variants;
    let response = web::block(move || data.engine.run_query(&query))
        .await
        .map_err(|e| CustomError::new(LookupError::Data(format!("blocking task failed: {}", e))))?
        .map_err(CustomError::new)?;
    Ok(Json(response))
}

/// Public part of the configuration.
#[get("/api/v1/config")]
async fn fetch_config(data: Data<WebServerData>) -> actix_web::Result<impl Responder, CustomError> {
    Ok(Json(data.engine.config().public()))
}

#[derive(Serialize, Debug)]
struct Health {
    status: &'static str,
}

#[get("/healthz")]
async fn healthz() -> impl Responder {
    Json(Health { status: "ok!" })
}

#[actix_web::main]
pub async fn main(args: &Args, data: Data<WebServerData>) -> std::io::Result<()> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(fetch_results)
            .service(fetch_config)
            .service(healthz)
            .wrap(Logger::default())
    });
    let server = match args.workers {
        Some(workers) => server.workers(workers),
        None => server,
    };
    server
        .bind((args.listen_host.as_str(), args.listen_port))?
        .run()
        .await
}
