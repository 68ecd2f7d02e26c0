use crate::http::make_boxed_error_response;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Liveness and readiness endpoints for orchestrators.
///
/// `/health` always answers 200. `/ready` answers 200 once `is_ready` returns true,
/// 503 before that.
pub struct AdminService<F, E> {
    is_ready: F,
    _error: PhantomData<E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self {
            is_ready,
            _error: PhantomData,
        }
    }

    fn respond(&self, path: &str) -> Response<BoxBody<Bytes, Infallible>> {
        let ok_body = || Full::new(Bytes::from("ok\n")).boxed();

        match path {
            "/health" => Response::new(ok_body()),
            "/ready" => match (self.is_ready)() {
                true => Response::new(ok_body()),
                false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
            },
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        }
    }
}

impl<F, E> Service<Request<Incoming>> for AdminService<F, E>
where
    F: Fn() -> bool + Send + 'static,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = self.respond(req.uri().path());
        Box::pin(async move { Ok(res) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_admin_paths() {
        let ready = Arc::new(AtomicBool::new(false));
        let ready_clone = ready.clone();
        let service: AdminService<_, Infallible> =
            AdminService::new(move || ready_clone.load(Ordering::Relaxed));

        assert_eq!(service.respond("/health").status(), StatusCode::OK);
        assert_eq!(
            service.respond("/ready").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(service.respond("/other").status(), StatusCode::NOT_FOUND);

        ready.store(true, Ordering::Relaxed);
        assert_eq!(service.respond("/ready").status(), StatusCode::OK);
    }
}
