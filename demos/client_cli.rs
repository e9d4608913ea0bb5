use std::time::Duration;

use clap::{App, Arg};
use skyfare::{Client, ClientConfig, Error};

// RUST_LOG=debug cargo run --color=always --example client_cli -- --host 127.0.0.1 --port 8080 --source "New York" --destination Houston

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = App::new("skyfare client")
        .version("0.1.0")
        .author("skyfare contributors")
        .about("Looks up flights against a flight-reservation server")
        .arg(
            Arg::with_name("host")
                .long("host")
                .takes_value(true)
                .default_value("127.0.0.1")
                .help("Server host"),
        )
        .arg(
            Arg::with_name("port")
                .long("port")
                .takes_value(true)
                .default_value("8080")
                .help("Server port"),
        )
        .arg(
            Arg::with_name("source")
                .long("source")
                .takes_value(true)
                .required(true)
                .help("Departure city"),
        )
        .arg(
            Arg::with_name("destination")
                .long("destination")
                .takes_value(true)
                .required(true)
                .help("Arrival city"),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap().to_owned();
    let port: u16 = matches.value_of("port").unwrap().parse().expect("port must be a u16");
    let source = matches.value_of("source").unwrap();
    let destination = matches.value_of("destination").unwrap();

    let config = ClientConfig {
        remote_host: host,
        remote_port: port,
        retries: 3,
        deadline: Duration::from_secs(2),
        ..ClientConfig::default()
    };
    let client = Client::connect(config).await?;

    let flights = client.find_flights(source, destination).await?;
    println!("found {} flight(s) from {} to {}:", flights.len(), source, destination);
    for flight in &flights {
        println!(
            "  id={} airfare={:.2} seats_available={}",
            flight.id, flight.airfare, flight.seat_availability
        );
    }

    Ok(())
}
