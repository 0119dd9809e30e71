// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 cupsd-rs contributors
//
// The HTTP transport. A hyper 1.x listener stands in for a bare
// `TcpStream` read loop because this daemon serves several distinct
// resource paths (`/`, `/admin`, `/printers/*`, `/classes/*`, `/jobs/*`)
// each with their own access policy, and needs real status lines/headers
// for 401/403 short-circuits rather than an always-200 IPP response — a
// job hyper is built for and a bare socket loop is not.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use cupsd_core::error::Error;
use cupsd_dispatch::{dispatch, DispatchContext};
use cupsd_ipp::codec;
use cupsd_policy::auth::{self, AuthRequest, AuthScheme};
use cupsd_policy::policy::{check_access, Preflight};

use crate::app::AppState;

pub async fn serve(state: Arc<AppState>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening for IPP connections");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = hyper::service::service_fn(move |req| {
                handle(req, state.clone(), peer)
            });
            if let Err(e) = auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                warn!(error = %e, %peer, "connection closed with error");
            }
        });
    }
}

async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let is_loopback = peer.ip().is_loopback();
    let remote_ip = peer.ip().to_string();

    if method != Method::POST {
        return Ok(text_response(StatusCode::OK, "cupsd: IPP endpoint, POST application/ipp\n"));
    }

    let preflight = state.policy.preflight(&path, method.as_str(), &remote_ip);

    let identity = match preflight {
        Preflight::Forbidden | Preflight::DenyAll => {
            return Ok(empty_response(StatusCode::FORBIDDEN));
        }
        Preflight::Allowed => auth::Identity::anonymous(),
        Preflight::RequiresAuth { auth_type, require } => {
            if !is_loopback && !state.config.remote_admin && require.require_admin {
                return Ok(empty_response(StatusCode::FORBIDDEN));
            }
            let scheme = AuthScheme::normalize(auth_type.unwrap_or(""), &state.config.default_auth_type);
            let authorization_header = req
                .headers()
                .get(hyper::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            let auth_req = AuthRequest {
                scheme,
                authorization_header,
                method: method.as_str(),
                request_uri: &path,
                is_loopback,
                tls_client_cert_cn: None,
                nonce_secret: &state.nonce_secret,
            };
            match auth::authenticate(&state.store, &auth_req) {
                Ok(identity) => {
                    let groups = state.env.groups_for(&identity.username);
                    if !check_access(require, &identity.username, identity.is_admin, None, groups) {
                        return Ok(empty_response(StatusCode::FORBIDDEN));
                    }
                    identity
                }
                Err(failure) => {
                    let mut response = empty_response(StatusCode::UNAUTHORIZED);
                    for challenge in failure.www_authenticate {
                        if let Ok(value) = hyper::header::HeaderValue::from_str(&challenge) {
                            response.headers_mut().append(hyper::header::WWW_AUTHENTICATE, value);
                        }
                    }
                    return Ok(response);
                }
            }
        }
    };

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(error = %e, "failed to read request body");
            return Ok(ipp_error_response(&Error::BadRequest("failed to read request body".to_string()), 0));
        }
    };

    let (request, document_bytes) = match codec::decode(&body) {
        Ok(pair) => pair,
        Err(e) => return Ok(ipp_error_response(&e, 0)),
    };

    let ctx = DispatchContext {
        store: &state.store,
        username: &identity.username,
        is_admin: identity.is_admin,
        user_cancel_any: state.config.user_cancel_any,
        preserve_job_files: state.config.preserve_job_files,
        spool_dir: &state.config.spool_dir,
        ppd_dir: &state.config.ppd_dir,
        request_path: &path,
    };
    let response_msg = dispatch(&ctx, &request, &document_bytes);
    state.sync_discovery();

    let encoded = codec::encode(&response_msg);
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, "application/ipp")
        .body(Full::new(Bytes::from(encoded)))
        .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR)))
}

fn ipp_error_response(err: &Error, request_id: u32) -> Response<Full<Bytes>> {
    let mut response = codec::Message::new_response(err.ipp_status(), request_id);
    response.group_mut(codec::group_tag::OPERATION).set(
        "status-message",
        codec::Value::TextWithoutLanguage(err.to_string()),
    );
    let encoded = codec::encode(&response);
    Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, "application/ipp")
        .body(Full::new(Bytes::from(encoded)))
        .unwrap_or_else(|_| empty_response(StatusCode::INTERNAL_SERVER_ERROR))
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn text_response(status: StatusCode, text: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(text.to_string())))
        .unwrap_or_else(|_| empty_response(status))
}
