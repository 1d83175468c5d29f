use actix_session::storage::CookieSessionStore;
use actix_session::{SessionExt, SessionMiddleware};
use actix_web::cookie::Key;
use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::{get, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use cas_strategy::actix::{urls, ActixCasStrategy, CAS_PRINCIPAL_SESSION_KEY};
use cas_strategy::{CasConfig, CasPrincipal, CasStrategy, Verdict};
use dotenv::dotenv;
use std::env;

#[get("/")]
async fn guest(_req: HttpRequest) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::build(StatusCode::OK)
        .content_type("text/html; charset=utf-8")
        .body(
            "
            Welcome <b>Guest</b>!
            <br>
            <br><a href='/auth/cas/login'>Login (to '/auth/cas/login')</a>
            <br><a href='/user'>Login (to '/user')</a>
            <br><a href='/user/welcome'>Login (to '/user/welcome')</a>
        ",
        ))
}

async fn user(req: HttpRequest) -> Result<HttpResponse, Error> {
    let session = req.get_session();
    let principal = session
        .get::<CasPrincipal>(CAS_PRINCIPAL_SESSION_KEY)
        .unwrap_or(None);
    let username = match principal {
        Some(principal) => principal.username().to_owned(),
        None => "guest".to_owned(),
    };
    Ok(HttpResponse::build(StatusCode::OK)
        .content_type("text/html; charset=utf-8")
        .body(format!(
            "Welcome <b>{}</b>!
            <br>
            <br>
            <a href='/auth/cas/logout'>Logout</a>",
            username,
        )))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    dotenv().ok();

    HttpServer::new(|| {
        let auth_service = "/auth/cas";
        let cas = init_cas_strategy();
        App::new()
            .wrap(Logger::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), Key::from(&[0; 64]))
                    .cookie_secure(false)
                    .build(),
            )
            .app_data(cas.clone())
            .service(guest)
            .service(
                web::scope("/user")
                    .wrap(cas.clone())
                    .route("", web::get().to(user))
                    .route("/welcome", web::get().to(user)),
            )
            .configure(|cfg| urls::register(cfg, auth_service, &cas))
    })
    .bind("localhost:8080")?
    .run()
    .await
}

fn init_cas_strategy() -> ActixCasStrategy {
    let env_or_default = |key: &str, default: &str| env::var(key).unwrap_or(default.to_string());
    let sso_base_url = env_or_default("CAS_SSO_BASE_URL", "https://cas.example.com");
    let server_base_url = env_or_default("CAS_SERVER_BASE_URL", "http://localhost:8080");

    let mut config = CasConfig::new(&sso_base_url, &server_base_url);
    if let Ok(version) = env::var("CAS_VERSION") {
        config.set_version(version.parse().unwrap());
    }
    if let Ok(use_saml) = env::var("CAS_USE_SAML") {
        config.set_use_saml(use_saml == "true" || use_saml == "1");
    }
    if let Ok(validate_url) = env::var("CAS_VALIDATE_URL") {
        config.set_validate_url(&validate_url);
    }
    if let Ok(service_url) = env::var("CAS_SERVICE_URL") {
        config.set_service_url(&service_url);
    }

    // accept every principal the CAS server vouches for
    let strategy = CasStrategy::new(config, |context| {
        Ok(Verdict::Accept {
            user: context.principal,
            info: None,
        })
    })
    .unwrap();

    let mut cas = ActixCasStrategy::new(strategy);
    cas.set_after_login_path("/user");
    cas
}
