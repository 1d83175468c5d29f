//! actix-web integration for the CAS ticket-validation strategy.
//!
//! [`ActixCasStrategy`] wraps a [`CasStrategy`] and is usable both as app
//! data (through a `FromRequest` extractor) and as middleware. The
//! middleware lets requests with an authenticated session pass through and
//! runs the strategy for everything else, rendering its decision as HTTP
//! responses.

#[macro_use]
extern crate log;

pub mod urls;

use std::future::{ready, Ready};
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_session::SessionExt;
use actix_web::body::EitherBody;
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::ErrorInternalServerError;
use actix_web::http::{header, StatusCode};
use actix_web::{web, Error, FromRequest, HttpRequest, HttpResponse};
use futures::future::LocalBoxFuture;

use cas_strategy_core::{
    AuthDecision, AuthenticateOptions, CasError, CasPrincipal, CasRequest, CasStrategy,
};

/// Session key under which the authenticated principal is stored.
pub const CAS_PRINCIPAL_SESSION_KEY: &str = "cas_principal";

/// What the middleware does with a request that has no authenticated
/// session: run the CAS strategy (redirect to login / validate a ticket),
/// or deny outright without contacting the SSO server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OnUnauthenticated {
    RunStrategy,
    Deny,
}

#[derive(Clone, Debug)]
pub struct ActixCasStrategy {
    strategy: CasStrategy,
    on_unauthenticated: OnUnauthenticated,
    login_params: Vec<(String, String)>,
    after_login_path: String,
}

impl ActixCasStrategy {
    pub fn new(strategy: CasStrategy) -> Self {
        ActixCasStrategy {
            strategy,
            on_unauthenticated: OnUnauthenticated::RunStrategy,
            login_params: Vec::new(),
            after_login_path: "/".to_string(),
        }
    }

    pub fn strategy(&self) -> &CasStrategy {
        &self.strategy
    }

    pub fn set_on_unauthenticated(&mut self, behavior: OnUnauthenticated) -> &mut Self {
        self.on_unauthenticated = behavior;
        self
    }

    /// Extra parameters forwarded to the SSO login page on redirect.
    pub fn set_login_params(&mut self, login_params: Vec<(String, String)>) -> &mut Self {
        self.login_params = login_params;
        self
    }

    pub fn after_login_path(&self) -> &str {
        &self.after_login_path
    }

    /// Where the login handler sends the user once authenticated.
    pub fn set_after_login_path(&mut self, after_login_path: &str) -> &mut Self {
        self.after_login_path = after_login_path.to_string();
        self
    }

    pub fn logout_url(&self) -> String {
        self.strategy.logout_url()
    }
}

/// Enable ActixCasStrategy to be used in actix extractors. Typically it is
/// added with the `.app_data` method of `actix_web::App`, e.g.
/// `App::new().wrap(session).app_data(your_strategy.clone())`.
impl FromRequest for ActixCasStrategy {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.app_data::<ActixCasStrategy>() {
            Some(strategy) => ready(Ok(strategy.clone())),
            None => {
                debug!(
                    "Failed to find ActixCasStrategy. Request path: {:?}",
                    req.path()
                );
                ready(Err(ErrorInternalServerError(
                    "App data is not configured with ActixCasStrategy. See documentation.",
                )))
            }
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ActixCasStrategy
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CasMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CasMiddleware {
            service: Rc::new(service),
            inner: self.clone(),
        }))
    }
}

pub struct CasMiddleware<S> {
    service: Rc<S>,
    inner: ActixCasStrategy,
}

impl<S, B> Service<ServiceRequest> for CasMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let inner = self.inner.clone();
        Box::pin(async move {
            let session = req.get_session();
            let cas_request = cas_request_for(&req);

            // Front-channel single logout is sent by the SSO server to a
            // browser that still holds an authenticated session, so the
            // short-circuits below only apply to ordinary requests.
            if cas_request.relay_state().is_none() {
                if let Ok(Some(_)) = session.get::<CasPrincipal>(CAS_PRINCIPAL_SESSION_KEY) {
                    let res = service.call(req).await?;
                    return Ok(res.map_into_left_body());
                }

                if inner.on_unauthenticated == OnUnauthenticated::Deny {
                    return Ok(intercept(req, HttpResponse::Unauthorized().finish()));
                }
            }

            // ticket-free URL the user lands on after the session is set up
            let return_url = inner.strategy.service_url(&cas_request).ok();

            // the validation call blocks on the outbound HTTP request
            let strategy = inner.strategy.clone();
            let options = AuthenticateOptions {
                login_params: inner.login_params.clone(),
            };
            let request = cas_request.clone();
            let decision = web::block(move || strategy.authenticate(&request, &options))
                .await
                .map_err(Error::from)?;

            match decision {
                Ok(AuthDecision::RedirectToLogin(url)) => Ok(intercept(req, redirect(&url))),
                Ok(AuthDecision::RedirectToLogout(url)) => {
                    session.purge();
                    Ok(intercept(req, redirect(&url)))
                }
                Ok(AuthDecision::Authenticated { user, info }) => {
                    debug!(
                        "Authenticated principal: {} (info: {:?})",
                        user.username(),
                        info
                    );
                    if let Err(err) = session.insert(CAS_PRINCIPAL_SESSION_KEY, &user) {
                        error!("Error while saving principal in session! Error: {}", err);
                    }
                    let location =
                        return_url.unwrap_or_else(|| inner.after_login_path.clone());
                    Ok(intercept(req, redirect(&location)))
                }
                Ok(AuthDecision::Rejected { info }) => {
                    warn!("CAS authentication rejected: {:?}", info);
                    Ok(intercept(req, HttpResponse::Unauthorized().finish()))
                }
                Err(err) => {
                    error!("CAS authentication error: {}", err);
                    let status = match err {
                        CasError::Unreachable(_) => StatusCode::GATEWAY_TIMEOUT,
                        _ => StatusCode::INTERNAL_SERVER_ERROR,
                    };
                    Ok(intercept(req, HttpResponse::build(status).finish()))
                }
            }
        })
    }
}

fn intercept<B>(req: ServiceRequest, response: HttpResponse) -> ServiceResponse<EitherBody<B>> {
    req.into_response(response).map_into_right_body()
}

fn redirect(url: &str) -> HttpResponse {
    HttpResponse::TemporaryRedirect()
        .insert_header((header::LOCATION, url))
        .finish()
}

fn cas_request_for(req: &ServiceRequest) -> CasRequest {
    let connection_info = req.connection_info();
    let url = format!(
        "{}://{}{}",
        connection_info.scheme(),
        connection_info.host(),
        req.uri()
    );
    CasRequest::new(&url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_session::storage::CookieSessionStore;
    use actix_session::SessionMiddleware;
    use actix_web::cookie::Key;
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::App;
    use cas_strategy_core::{CasConfig, Verdict};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const SSO_BASE: &str = "http://cas.example.org";
    const SERVER_BASE: &str = "http://localhost";

    fn cas_strategy_for(sso_base: &str) -> ActixCasStrategy {
        let config = CasConfig::new(sso_base, SERVER_BASE);
        let strategy = CasStrategy::new(config, |context| {
            Ok(Verdict::Accept {
                user: context.principal,
                info: None,
            })
        })
        .unwrap();
        ActixCasStrategy::new(strategy)
    }

    fn cas_strategy() -> ActixCasStrategy {
        cas_strategy_for(SSO_BASE)
    }

    /// Serves one canned HTTP response on a loopback socket, standing in
    /// for the CAS validation endpoint.
    fn spawn_canned_cas(body: &'static str) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let handle = thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{}", addr), handle)
    }

    fn session_middleware() -> SessionMiddleware<CookieSessionStore> {
        SessionMiddleware::builder(CookieSessionStore::default(), Key::from(&[0; 64]))
            .cookie_secure(false)
            .build()
    }

    async fn protected() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn unauthenticated_request_redirects_to_sso() {
        let cas = cas_strategy();
        let app = init_service(
            App::new().wrap(session_middleware()).service(
                web::scope("/user")
                    .wrap(cas.clone())
                    .route("", web::get().to(protected)),
            ),
        )
        .await;

        let resp = call_service(&app, TestRequest::get().uri("/user").to_request()).await;
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = resp
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(location.contains(SSO_BASE));
        assert!(location.contains("service="));
    }

    #[actix_web::test]
    async fn deny_policy_returns_401_without_redirect() {
        let mut cas = cas_strategy();
        cas.set_on_unauthenticated(OnUnauthenticated::Deny);
        let app = init_service(
            App::new().wrap(session_middleware()).service(
                web::scope("/user")
                    .wrap(cas.clone())
                    .route("", web::get().to(protected)),
            ),
        )
        .await;

        let resp = call_service(&app, TestRequest::get().uri("/user").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().get(header::LOCATION).is_none());
    }

    #[actix_web::test]
    async fn session_principal_passes_through() {
        let cas = cas_strategy();
        let app = init_service(
            App::new()
                .wrap(session_middleware())
                .route(
                    "/seed",
                    web::get().to(|req: HttpRequest| async move {
                        let session = req.get_session();
                        session
                            .insert(CAS_PRINCIPAL_SESSION_KEY, CasPrincipal::new("alice", None))
                            .unwrap();
                        HttpResponse::Ok().finish()
                    }),
                )
                .service(
                    web::scope("/user")
                        .wrap(cas.clone())
                        .route("", web::get().to(protected)),
                ),
        )
        .await;

        let seed = call_service(&app, TestRequest::get().uri("/seed").to_request()).await;
        let cookie = seed
            .response()
            .cookies()
            .next()
            .expect("session cookie not set")
            .into_owned();

        let req = TestRequest::get().uri("/user").cookie(cookie).to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn single_logout_intercepts_an_authenticated_session() {
        let cas = cas_strategy();
        let app = init_service(
            App::new()
                .wrap(session_middleware())
                .route(
                    "/seed",
                    web::get().to(|req: HttpRequest| async move {
                        let session = req.get_session();
                        session
                            .insert(CAS_PRINCIPAL_SESSION_KEY, CasPrincipal::new("alice", None))
                            .unwrap();
                        HttpResponse::Ok().finish()
                    }),
                )
                .service(
                    web::scope("/user")
                        .wrap(cas.clone())
                        .route("", web::get().to(protected)),
                ),
        )
        .await;

        let seed = call_service(&app, TestRequest::get().uri("/seed").to_request()).await;
        let cookie = seed
            .response()
            .cookies()
            .next()
            .expect("session cookie not set")
            .into_owned();

        // the SSO server's front-channel logout request carries RelayState
        // and reaches a browser that still holds an authenticated session
        let req = TestRequest::get()
            .uri("/user?RelayState=xyz")
            .cookie(cookie)
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = resp
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(
            location,
            "http://cas.example.org/logout?_eventId=next&RelayState=xyz"
        );
    }

    #[actix_web::test]
    async fn valid_ticket_establishes_session_and_redirects_ticket_free() {
        let (sso_base, server) = spawn_canned_cas("yes\nalice\n");
        let cas = cas_strategy_for(&sso_base);
        let app = init_service(
            App::new().wrap(session_middleware()).service(
                web::scope("/user")
                    .wrap(cas.clone())
                    .route("", web::get().to(protected)),
            ),
        )
        .await;

        let req = TestRequest::get().uri("/user?ticket=ST-1").to_request();
        let resp = call_service(&app, req).await;
        server.join().unwrap();

        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = resp
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(!location.contains("ticket"));
        assert!(location.ends_with("/user"));

        // the principal was stored, so the redirected request passes through
        let cookie = resp
            .response()
            .cookies()
            .next()
            .expect("session cookie not set")
            .into_owned();
        let req = TestRequest::get().uri("/user").cookie(cookie).to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn extractor_requires_app_data() {
        let app = init_service(
            App::new()
                .wrap(session_middleware())
                .route("/logout", web::get().to(urls::logout)),
        )
        .await;
        let resp = call_service(&app, TestRequest::get().uri("/logout").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn logout_handler_redirects_to_sso_logout() {
        let cas = cas_strategy();
        let app = init_service(
            App::new()
                .wrap(session_middleware())
                .app_data(cas.clone())
                .route("/logout", web::get().to(urls::logout)),
        )
        .await;
        let resp = call_service(&app, TestRequest::get().uri("/logout").to_request()).await;
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = resp
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(location, "http://cas.example.org/logout");
    }
}
