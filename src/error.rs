use std::io;

quick_error! {
    /// Errors surfaced by the server lifecycle.
    ///
    /// Protocol failures never show up here: they are answered on the wire
    /// (400/413/503) or end the connection silently.
    #[derive(Debug)]
    pub enum Error {
        Bind(err: io::Error) {
            description("error binding listen socket")
            display("error binding listen socket: {}", err)
        }
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
    }
}
