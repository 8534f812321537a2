extern crate env_logger;
extern crate ev_http;

use std::env;

use ev_http::{Request, Response, Server};

const BODY: &'static str = "Hello World!";

fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init().expect("init logging");

    let server = Server::init(8080, |req: Request| {
        let mut response = Response::new();
        response.header("Content-Type", "text/plain");
        response.header("Server",
                        concat!("ev-http/", env!("CARGO_PKG_VERSION")));
        response.body(BODY);
        req.respond(response);
    }).expect("server init");
    server.listen().expect("listen");
}
