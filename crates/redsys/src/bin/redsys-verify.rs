//! Verify a notification from the command line.
//!
//! Usage: redsys-verify <DS_MERCHANT_PARAMETERS> <DS_SIGNATURE> [KEY_BASE64]
//!
//! Without KEY_BASE64 the key is read from REDSYS_SHA256_KEY. Exits 1 when
//! the signature is rejected or the input is malformed.

use redsys::{decode_parameters, verify_notification, MerchantParameters, RedsysConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (encoded, signature, key_arg) = match args.as_slice() {
        [encoded, signature] => (encoded, signature, None),
        [encoded, signature, key] => (encoded, signature, Some(key.clone())),
        _ => {
            eprintln!("Usage: redsys-verify <DS_MERCHANT_PARAMETERS> <DS_SIGNATURE> [KEY_BASE64]");
            std::process::exit(2);
        }
    };

    let key = match key_arg {
        Some(key) => key,
        None => match RedsysConfig::from_env() {
            Ok(RedsysConfig {
                terminal_key: Some(key),
                ..
            }) => key,
            Ok(_) => {
                eprintln!("Error: no key given and REDSYS_SHA256_KEY is not set");
                std::process::exit(2);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(2);
            }
        },
    };

    let raw = match decode_parameters(encoded) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let parameters = match MerchantParameters::from_map(raw.clone()) {
        Ok(parameters) => parameters,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let Some(order) = parameters.order.as_deref().filter(|o| !o.is_empty()) else {
        eprintln!("Error: Ds_Order is missing from the merchant parameters");
        std::process::exit(1);
    };

    println!("Decoded parameters:");
    println!(
        "{}",
        serde_json::to_string_pretty(&raw).unwrap_or_default()
    );
    if let Some(amount) = parameters.amount_in_units() {
        println!("Amount: {amount:.2}");
    }
    if let Some(at) = parameters.notified_at() {
        println!("Notified at: {at}");
    }

    if verify_notification(encoded, signature, order, &key) {
        println!("\nSignature VALID for order {order}");
    } else {
        println!("\nSignature INVALID for order {order}");
        std::process::exit(1);
    }
}
