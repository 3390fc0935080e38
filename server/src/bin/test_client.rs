use bincode::{deserialize, serialize};
use shared::{Packet, Scores};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

// Manual smoke-test client: connects, joins a ping-pong room, wiggles the
// paddle for a while and prints every update the server relays back. Run two
// of these against one server to see a room fill up and start ticking.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:3000".to_string())
        .parse()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    // Handshake
    println!("Connecting to {}", server_addr);
    socket.send_to(&serialize(&Packet::Connect)?, server_addr).await?;

    let mut buf = [0u8; 4096];
    let (len, _) = socket.recv_from(&mut buf).await?;
    let connection_id = match deserialize::<Packet>(&buf[0..len])? {
        Packet::Connected { connection_id } => {
            println!("Connected with connection id {}", connection_id);
            connection_id
        }
        Packet::Refused { reason } => {
            println!("Connection refused: {}", reason);
            return Ok(());
        }
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };

    // Join matchmaking
    socket.send_to(&serialize(&Packet::JoinPingPong)?, server_addr).await?;
    let (len, _) = socket.recv_from(&mut buf).await?;
    let game_id = match deserialize::<Packet>(&buf[0..len])? {
        Packet::GameId { game_id, game_type } => {
            println!("Joined {} room {}", game_type.as_str(), game_id);
            game_id
        }
        other => {
            println!("Expected GameId but got: {:?}", other);
            return Ok(());
        }
    };

    // Wiggle the paddle and print whatever comes back for ten seconds. The
    // server stays quiet until a second client fills the room.
    for i in 0..10 {
        let x = 200.0 + 100.0 * (i as f32 / 3.0).sin();
        let paddle = Packet::MovePaddle {
            game_id: game_id.clone(),
            x,
        };
        socket.send_to(&serialize(&paddle)?, server_addr).await?;

        // Drain at most a second's worth of updates, then take a breath; an
        // active room broadcasts at 60 Hz and would otherwise never go quiet.
        let mut updates = 0u32;
        let mut last_scores = Scores::default();
        while updates < 60 {
            let Ok(Ok((len, _))) =
                timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await
            else {
                break;
            };
            match deserialize::<Packet>(&buf[0..len]) {
                Ok(Packet::StartGame) => println!("Game started!"),
                Ok(Packet::UpdateGame {
                    opponent_paddle_x,
                    ball,
                    scores,
                }) => {
                    updates += 1;
                    last_scores = scores;
                    if let Some(x) = opponent_paddle_x {
                        println!("Opponent paddle at x={:.1}", x);
                    }
                    if updates % 60 == 0 {
                        println!("Ball at ({:.1}, {:.1})", ball.x, ball.y);
                    }
                }
                Ok(Packet::PlayerDisconnected) => println!("Opponent disconnected"),
                Ok(other) => println!("Unexpected packet: {:?}", other),
                Err(e) => println!("Failed to deserialize update: {}", e),
            }
        }
        if updates > 0 {
            println!(
                "{} updates this second, scores {}:{}",
                updates, last_scores.player1, last_scores.player2
            );
        }
        sleep(Duration::from_millis(100)).await;
    }

    println!("Disconnecting connection {}", connection_id);
    socket.send_to(&serialize(&Packet::Disconnect)?, server_addr).await?;
    println!("Test client finished");

    Ok(())
}
