fn main() {
    // Load .env file for WiFi, node and broker configuration
    load_env_config();

    // Host builds of the library and its tests link with the system linker
    if std::env::var_os("CARGO_FEATURE_ESP32C3").is_none() {
        return;
    }

    linker_be_nice();
    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

/// Configuration variables exported to the crate, with the value used when
/// neither the environment nor `.env` provides one
const CONFIG_VARS: &[(&str, &str)] = &[
    ("WIFI_SSID", ""),
    ("WIFI_PASSWORD", ""),
    ("NODE_NAME", "BRAVO"),
    ("MQTT_BROKER_HOST", ""),
    ("MQTT_BROKER_PORT", "1883"),
    ("MQTT_USERNAME", ""),
    ("MQTT_PASSWORD", ""),
    ("TELESCOPE_LEGACY_TOPICS", "0"),
];

/// Load environment configuration from .env file
/// Environment variables take priority over .env file values
fn load_env_config() {
    use std::env;
    use std::path::Path;

    // Tell cargo to rerun this build script if .env file changes
    println!("cargo:rerun-if-changed=.env");

    // Tell cargo to rerun if environment variables change
    for (name, _) in CONFIG_VARS {
        println!("cargo:rerun-if-env-changed={}", name);
    }

    // Try to load .env file if it exists
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    for (name, fallback) in CONFIG_VARS {
        // Note: We need to handle the case where env vars are set to empty strings
        let value = env::var(name)
            .map(|v| v.trim().to_string())
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| fallback.to_string());

        // Set environment variables for the compilation
        println!("cargo:rustc-env={}={}", name, value);
    }

    // Print status
    let ssid = env::var("WIFI_SSID").unwrap_or_default();
    if ssid.trim().is_empty() {
        println!("cargo:warning=WIFI_SSID is empty - WiFi will not be configured");
    } else {
        println!("cargo:warning=WIFI_SSID configured: {}", ssid.trim());
    }

    let broker = env::var("MQTT_BROKER_HOST").unwrap_or_default();
    if broker.trim().is_empty() {
        println!("cargo:warning=MQTT_BROKER_HOST is empty - broker connection will fail");
    }

    let port = env::var("MQTT_BROKER_PORT").unwrap_or_default();
    if !port.trim().is_empty() && port.trim().parse::<u16>().is_err() {
        println!("cargo:warning=MQTT_BROKER_PORT is not a valid port: {}", port.trim());
    }
}

fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                "_defmt_timestamp" => {
                    eprintln!();
                    eprintln!("💡 `defmt` not found - make sure `defmt.x` is added as a linker script and you have included `use defmt_rtt as _;`");
                    eprintln!();
                }
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                "esp_wifi_preempt_enable"
                | "esp_wifi_preempt_yield_task"
                | "esp_wifi_preempt_task_create" => {
                    eprintln!();
                    eprintln!("💡 `esp-wifi` has no scheduler enabled. Make sure you have the `builtin-scheduler` feature enabled, or that you provide an external scheduler.");
                    eprintln!();
                }
                _ => (),
            },
            // we don't have anything helpful for "missing-lib" yet
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }

    println!(
        "cargo:rustc-link-arg=--error-handling-script={}",
        std::env::current_exe().unwrap().display()
    );
}
