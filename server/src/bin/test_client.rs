use clap::Parser;
use shared::{Packet, Vec3};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted client for the demo host", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name; a leading '.' makes the session look bridged
    #[arg(short = 'n', long, default_value = ".Tester")]
    name: String,

    /// Acknowledge finish-configuration like a native client
    #[arg(long)]
    native_finish: bool,

    /// Send one oversized move after entering play
    #[arg(long)]
    glitch_move: bool,

    /// Seconds to stay connected
    #[arg(short = 'd', long, default_value = "45")]
    duration: u64,
}

async fn send(socket: &UdpSocket, packet: &Packet, server: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let data = packet.encode()?;
    socket.send_to(&data, server).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = args.server.parse::<SocketAddr>()?;
    println!("Connecting to {} as {:?}", server_addr, args.name);
    send(
        &socket,
        &Packet::Connect {
            display_name: args.name.clone(),
        },
        server_addr,
    )
    .await?;

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut heartbeat = interval(Duration::from_secs(1));
    let mut buf = [0u8; 2048];
    let mut position = Vec3::default();
    let mut glitched = false;

    loop {
        tokio::select! {
            _ = sleep(deadline.saturating_duration_since(Instant::now())) => break,

            _ = heartbeat.tick() => {
                send(&socket, &Packet::Heartbeat, server_addr).await?;
            }

            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                let packet = match Packet::decode(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        println!("Failed to deserialize packet: {}", e);
                        continue;
                    }
                };
                println!("<- {:?}", packet);

                match packet {
                    Packet::ConfigurationTask { task_id, .. } => {
                        send(&socket, &Packet::TaskDone { task_id }, server_addr).await?;
                        if args.native_finish {
                            send(&socket, &Packet::FinishConfiguration, server_addr).await?;
                        }
                    }
                    Packet::StartPlay { position: start } => {
                        position = start;
                        if args.glitch_move && !glitched {
                            glitched = true;
                            let target = Vec3::new(position.x + 50.0, position.y, position.z);
                            println!("-> oversized move to {:?}", target);
                            send(&socket, &Packet::Move { position: target, vel_y: 0.0 }, server_addr).await?;
                        }
                    }
                    Packet::Disconnected { reason } => {
                        println!("Disconnected by server: {}", reason);
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
    }

    send(&socket, &Packet::Disconnect, server_addr).await?;
    println!("Test client finished at {:?}", position);
    Ok(())
}
