use actix_session::SessionExt;
use actix_web::http::{header, StatusCode};
use actix_web::{web, Error, HttpRequest, HttpResponse};

use crate::ActixCasStrategy;

/// Login landing handler. Wrap it with the strategy middleware: by the time
/// it runs the middleware has authenticated the user, so it only forwards
/// to the configured after-login path.
pub async fn login(cas: ActixCasStrategy) -> Result<HttpResponse, Error> {
    debug!("*** CAS LOGIN: {:?} ***", cas);
    Ok(HttpResponse::build(StatusCode::TEMPORARY_REDIRECT)
        .insert_header((header::LOCATION, cas.after_login_path()))
        .finish())
}

/// Clears the local session and forwards the user to the SSO logout page.
pub async fn logout(req: HttpRequest, cas: ActixCasStrategy) -> Result<HttpResponse, Error> {
    debug!("*** CAS LOGOUT: {:?} ***", cas);
    let session = req.get_session();
    session.purge();
    Ok(HttpResponse::build(StatusCode::TEMPORARY_REDIRECT)
        .insert_header((header::LOCATION, cas.logout_url()))
        .finish())
}

/// Registers the login/logout routes under `auth_service` (e.g.
/// "/auth/cas"), wrapping the login route with the strategy middleware.
pub fn register(cfg: &mut web::ServiceConfig, auth_service: &str, cas: &ActixCasStrategy) {
    cfg.service(
        web::resource(format!("{}/logout", auth_service))
            .name("cas_logout")
            .route(web::get().to(logout)),
    );
    cfg.service(
        web::resource(format!("{}/login", auth_service))
            .name("cas_login")
            .wrap(cas.clone())
            .route(web::get().to(login)),
    );
}
