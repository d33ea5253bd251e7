fn main() {
    println!("tactix — networked two-player tic-tac-toe");
    println!();
    println!("Usage:");
    println!("  Start the server:   cargo run --bin server -- <port>");
    println!("  Connect a client:   cargo run --bin client -- <name> [host:port]");
    println!();
    println!("Run two clients against the same server to start a game;");
    println!("the first to join plays X. Default client target is 127.0.0.1:7878.");
}
