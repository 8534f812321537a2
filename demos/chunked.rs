extern crate env_logger;
extern crate ev_http;

use std::cell::Cell;
use std::env;
use std::rc::Rc;

use ev_http::{Request, Response, Server};

const PIECES: &'static [&'static str] = &[
    "chunked ", "responses ", "are ", "streamed ", "one ", "piece ",
    "at ", "a ", "time\n",
];

fn send_piece(req: Request) {
    let index: Rc<Cell<usize>> =
        req.userdata().expect("set in handler").downcast().ok().unwrap();
    let i = index.get();
    if i < PIECES.len() {
        index.set(i + 1);
        let mut response = Response::new();
        response.body(PIECES[i]);
        req.respond_chunk(response, send_piece);
    } else {
        req.respond_chunk_end(Response::new());
    }
}

fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init().expect("init logging");

    let server = Server::init(8080, |req: Request| {
        req.set_userdata(Rc::new(Cell::new(1usize)));
        let mut response = Response::new();
        response.header("Content-Type", "text/plain");
        response.body(PIECES[0]);
        req.respond_chunk(response, send_piece);
    }).expect("server init");
    server.listen().expect("listen");
}
