//! Print a signed sample notification for an order, as the gateway would
//! post it. Useful for exercising a notification endpoint by hand.
//!
//! Usage: redsys-payload <ORDER> <KEY_BASE64>

use std::collections::BTreeMap;

use redsys::Notification;

fn sample_parameters(order: &str) -> BTreeMap<String, String> {
    let control = chrono::Utc::now().timestamp_millis().to_string();
    let mut params: BTreeMap<String, String> = [
        ("Ds_Date", "09/11/2025"),
        ("Ds_Hour", "21:30"),
        ("Ds_SecurePayment", "1"),
        ("Ds_Card_Country", "724"),
        ("Ds_Amount", "900"),
        ("Ds_Currency", "978"),
        ("Ds_MerchantCode", "263100000"),
        ("Ds_Terminal", "049"),
        ("Ds_Response", "0000"),
        ("Ds_MerchantData", ""),
        ("Ds_TransactionType", "38"),
        ("Ds_ConsumerLanguage", "1"),
        ("Ds_AuthorisationCode", "333982"),
        ("Ds_Card_Brand", "1"),
        ("Ds_Card_Typology", "CONSUMO"),
        ("Ds_ProcessedPayMethod", "78"),
        ("Ds_Titular", "Daniel"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    params.insert(format!("Ds_Control_{control}"), control);
    params.insert("Ds_Order".to_string(), order.to_string());
    params
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [order, key] = args.as_slice() else {
        eprintln!("Usage: redsys-payload <ORDER> <KEY_BASE64>");
        std::process::exit(2);
    };

    match Notification::signed(&sample_parameters(order), order, key) {
        Ok(notification) => {
            println!("Ds_SignatureVersion: {}", redsys::SIGNATURE_VERSION);
            println!("Ds_MerchantParameters: {}", notification.merchant_parameters);
            println!("Ds_Signature: {}", notification.signature);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
