use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};

use crate::auth::AuthService;
use crate::middleware::RequestLogger;
use crate::routes::{health_check, login, refresh, sign_up};

pub fn run(listener: TcpListener, service: AuthService) -> Result<Server, std::io::Error> {
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            .app_data(service.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/sign-up", web::post().to(sign_up))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
