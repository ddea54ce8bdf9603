//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, der Server laeuft also auch ohne Konfigurationsdatei.
//! `LKH_LOG_LEVEL` und `LKH_LOG_FORMAT` ueberschreiben den `[logging]`-Block.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use lkhcast_core::AlgorithmVersion;
use lkhcast_crypto::CipherSuite;
use lkhcast_keytree::AlgorithmConfig;
use lkhcast_transport::MulticastConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub gruppe: GruppenEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Algorithmus und Schluessel, einmalig beim Start festgelegt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GruppenEinstellungen {
    pub algorithmus: AlgorithmVersion,
    pub suite: CipherSuite,
    pub erste_mitglieds_id: u32,
    /// Takt der Batch-Varianten
    pub batch_intervall_ms: u64,
    /// Tiefendifferenz, ab der `balanced_batch` neu aufbaut
    pub balance_schwelle: u32,
    /// Groessere Rekey-Pakete werden aufgeteilt
    pub max_paket_laenge: usize,
}

impl Default for GruppenEinstellungen {
    fn default() -> Self {
        let algorithmus = AlgorithmConfig::default();
        Self {
            algorithmus: algorithmus.version,
            suite: algorithmus.suite,
            erste_mitglieds_id: algorithmus.erste_mitglieds_id,
            batch_intervall_ms: 1_000,
            balance_schwelle: algorithmus.balance_schwelle,
            max_paket_laenge: algorithmus.max_paket_laenge,
        }
    }
}

impl GruppenEinstellungen {
    pub fn algorithm_config(&self) -> AlgorithmConfig {
        AlgorithmConfig {
            version: self.algorithmus,
            suite: self.suite,
            erste_mitglieds_id: self.erste_mitglieds_id,
            balance_schwelle: self.balance_schwelle,
            max_paket_laenge: self.max_paket_laenge,
        }
    }

    pub fn batch_intervall(&self) -> Duration {
        Duration::from_millis(self.batch_intervall_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer die Unicast-Handshakes
    pub bind_adresse: String,
    pub unicast_port: u16,
    /// Wartezeit je Handshake-Nachricht
    pub handshake_timeout_ms: u64,
    pub multicast: MulticastConfig,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            unicast_port: 4445,
            handshake_timeout_ms: 5_000,
            multicast: MulticastConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// "trace", "debug", "info", "warn" oder "error"
    pub level: String,
    /// "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Fehlt die Datei, gelten die Standardwerte.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.ueberschreiben(
            std::env::var("LKH_LOG_LEVEL").ok(),
            std::env::var("LKH_LOG_FORMAT").ok(),
        );
        Ok(config)
    }

    /// Wendet Umgebungswerte auf den Logging-Block an
    pub fn ueberschreiben(&mut self, level: Option<String>, format: Option<String>) {
        if let Some(level) = level.filter(|l| !l.is_empty()) {
            self.logging.level = level;
        }
        if let Some(format) = format.filter(|f| !f.is_empty()) {
            self.logging.format = format;
        }
    }

    pub fn unicast_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.unicast_port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.netzwerk.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.gruppe.algorithmus, AlgorithmVersion::Simple);
        assert_eq!(cfg.gruppe.erste_mitglieds_id, 100);
        assert_eq!(cfg.unicast_bind_adresse(), "0.0.0.0:4445");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [gruppe]
            algorithmus = "batch_single_message"
            suite = "chacha20poly1305"
            batch_intervall_ms = 250

            [netzwerk.multicast]
            gruppe = "239.1.1.1"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.gruppe.algorithmus, AlgorithmVersion::BatchSingleMessage);
        assert_eq!(cfg.gruppe.suite, CipherSuite::ChaCha20Poly1305);
        assert_eq!(cfg.gruppe.batch_intervall(), Duration::from_millis(250));
        assert_eq!(cfg.netzwerk.multicast.ziel().to_string(), "239.1.1.1:4446");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.unicast_port, 4445);
        assert_eq!(cfg.gruppe.algorithm_config().balance_schwelle, 1);
        assert_eq!(cfg.gruppe.algorithm_config().max_paket_laenge, 65_507);
    }

    #[test]
    fn umgebung_ueberschreibt_logging() {
        let mut cfg = ServerConfig::default();
        cfg.ueberschreiben(Some("debug".into()), None);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, "text");
        cfg.ueberschreiben(Some(String::new()), Some("json".into()));
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, "json");
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/lkhcast.toml").unwrap();
        assert_eq!(cfg.netzwerk.unicast_port, 4445);
    }
}
