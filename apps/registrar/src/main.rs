// [apps/registrar/src/main.rs]
/*!
 * =================================================================
 * APARATO: DEVICE REGISTRAR CLI (V4.1 - VAULT SEALED)
 * CLASIFICACIÓN: CLIENT SHELL (ESTRATO L6)
 * RESPONSABILIDAD: ALTA DE DISPOSITIVO Y BÓVEDA LOCAL CIFRADA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. KEY BIRTH AT EDGE: La llave del dispositivo nace aquí; solo la
 *    mitad pública viaja al plano de control.
 * 2. VAULT DISCIPLINE: La configuración resultante se sella con
 *    AES-256-GCM bajo derivación scrypt; la contraseña jamás toca el
 *    disco.
 * =================================================================
 */

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use edgelink_core_client_vault::{ConfigVault, DeviceConfig};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "edgelink-registrar",
    about = "Registro de dispositivos contra el plano de control EdgeLink."
)]
struct RegistrarCli {
    #[command(subcommand)]
    command: RegistrarCommand,
}

#[derive(Subcommand)]
enum RegistrarCommand {
    /// Registra este dispositivo y sella la bóveda de configuración.
    Register {
        /// URL del plano de control (ej: https://mesh.example.com).
        #[arg(long)]
        server: String,

        /// Llave pre-compartida de registro.
        #[arg(long)]
        psk: String,

        /// Nombre del dispositivo dentro de la red.
        #[arg(long)]
        name: String,

        /// Slug de la organización propietaria.
        #[arg(long)]
        org: String,

        /// Identificador de la red virtual destino.
        #[arg(long)]
        network: String,

        /// Ruta de la bóveda de configuración.
        #[arg(long)]
        config: PathBuf,

        /// Contraseña de sellado de la bóveda.
        #[arg(long)]
        password: String,
    },

    /// Abre la bóveda y muestra la configuración registrada.
    Show {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        password: String,
    },
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "ios") {
        "ios"
    } else if cfg!(target_os = "android") {
        "android"
    } else {
        "iot"
    }
}

async fn run_register(
    server: String,
    psk: String,
    name: String,
    org: String,
    network: String,
    config_path: PathBuf,
    password: String,
) -> Result<()> {
    // 1. NACIMIENTO DE LA LLAVE DEL DISPOSITIVO
    let mut secret_seed = [0u8; 32];
    OsRng.fill_bytes(&mut secret_seed);
    let signing_key = SigningKey::from_bytes(&secret_seed);
    let public_key_b64 = BASE64.encode(signing_key.verifying_key().as_bytes());

    // 2. ALTA CONTRA EL PLANO DE CONTROL
    let endpoint = format!("{}/api/v1/device/register", server.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&endpoint)
        .header("X-Pre-Shared-Key", psk)
        .json(&json!({
            "public_key": public_key_b64,
            "platform": detect_platform(),
            "name": name,
            "org_slug": org,
            "virtual_network_id": network,
        }))
        .send()
        .await
        .context("REGISTRAR: control plane unreachable")?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .context("REGISTRAR: malformed control plane response")?;

    if !status.is_success() {
        let reason = body["error"]["message"].as_str().unwrap_or("unknown fault");
        bail!("REGISTRAR: registration rejected ({status}): {reason}");
    }

    let registration = &body["data"];
    let device_id = registration["device_id"]
        .as_str()
        .context("REGISTRAR: response missing device_id")?;
    let virtual_ip = registration["virtual_ip"]
        .as_str()
        .context("REGISTRAR: response missing virtual_ip")?;

    // 3. SELLADO DE LA BÓVEDA LOCAL
    let device_config = DeviceConfig {
        server_url: server,
        device_id: device_id.to_string(),
        virtual_network_id: registration["virtual_network_id"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        virtual_ip: virtual_ip.to_string(),
        private_key_base64: BASE64.encode(signing_key.to_bytes()),
    };

    ConfigVault::save(&device_config, &config_path, &password)
        .context("REGISTRAR: vault sealing failed")?;

    info!(
        "✅ [REGISTRAR]: Device {} registered at {} — vault sealed at {}.",
        device_id,
        virtual_ip,
        config_path.display()
    );
    println!("device_id={device_id}");
    println!("virtual_ip={virtual_ip}");
    Ok(())
}

fn run_show(config_path: PathBuf, password: String) -> Result<()> {
    let device_config = ConfigVault::load(&config_path, &password)
        .context("REGISTRAR: vault open failed (wrong password or tampered file)")?;

    // La mitad privada JAMÁS se imprime.
    println!("server_url={}", device_config.server_url);
    println!("device_id={}", device_config.device_id);
    println!("virtual_network_id={}", device_config.virtual_network_id);
    println!("virtual_ip={}", device_config.virtual_ip);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    edgelink_shared_heimdall::init_tracing("edgelink_registrar");

    match RegistrarCli::parse().command {
        RegistrarCommand::Register {
            server,
            psk,
            name,
            org,
            network,
            config,
            password,
        } => run_register(server, psk, name, org, network, config, password).await,
        RegistrarCommand::Show { config, password } => run_show(config, password),
    }
}
