use clap::Parser;
use log::warn;
use mbr_nostd::{MasterBootRecord, PartitionTable};
use pretty_hex::PrettyHex;
use sdspi::{bus::linux, BlockDevice, CardType, Config, Ioctl, SECTOR_SIZE};
use size::Size;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Specify SPI device
    #[clap(short, long, value_parser)]
    spi: String,

    /// Specify chip-select GPIO number
    #[clap(short, long, value_parser)]
    cs: u16,

    /// SPI clock once the card is initialized, in Hz
    #[clap(long, value_parser, default_value_t = 2_000_000)]
    speed: u32,

    /// Hexdump sector 0
    #[clap(long)]
    dump: bool,
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    let config = Config::default().high_speed(args.speed);
    let driver = linux::builder(&args.spi, args.cs).map_err(|e| e.to_string())?.config(config).build();
    let status = driver.initialize();
    if !status.is_empty() {
        return Err(format!("Card not ready: {:?}", status));
    }

    let mut kind = CardType::Unknown;
    driver.ioctl(Ioctl::GetCardType(&mut kind)).map_err(|e| e.to_string())?;
    println!("Card: {:?}", kind);
    let mut sectors = 0u64;
    driver.ioctl(Ioctl::GetSectorCount(&mut sectors)).map_err(|e| e.to_string())?;
    println!("Size {} ({} sectors)", Size::from_bytes(sectors * SECTOR_SIZE as u64), sectors);
    let mut erase_block = 0u32;
    match driver.ioctl(Ioctl::GetBlockSize(&mut erase_block)) {
        Ok(()) => println!("Erase block {} sectors", erase_block),
        Err(e) => warn!("Erase block size unavailable: {}", e),
    }

    let mut buffer = [0u8; SECTOR_SIZE];
    driver.read(&mut buffer, 0, 1).map_err(|e| e.to_string())?;
    if args.dump {
        println!("{:?}", buffer.hex_dump());
    }
    let mbr = MasterBootRecord::from_bytes(&buffer).map_err(|e| format!("{:?}", e))?;
    for partition in mbr.partition_table_entries().iter() {
        println!("{:?}", partition);
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
