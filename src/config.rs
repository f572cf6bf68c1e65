// src/config.rs
//
// Central configuration for the pilot.
//
// `Config::default()` carries every tunable; `Config::from_env()` layers
// DRONEPILOT_* environment overrides on top. CLI flags are applied last by
// the binary, so precedence is CLI > env > default.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which decision strategy drives the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Rule,
    Rl,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Rule => "rule",
            PolicyKind::Rl => "rl",
        }
    }

    /// Parse a policy name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<PolicyKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rule" | "rules" | "rule-based" | "heuristic" => Some(PolicyKind::Rule),
            "rl" | "q" | "qlearning" | "q-learning" => Some(PolicyKind::Rl),
            _ => None,
        }
    }
}

/// Q-learning hyperparameters and table location.
#[derive(Debug, Clone, PartialEq)]
pub struct RlConfig {
    /// Exploration probability.
    pub epsilon: f64,
    /// Learning rate.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    pub qtable_path: PathBuf,
    /// Exploration RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            alpha: 0.1,
            gamma: 0.9,
            qtable_path: PathBuf::from("qtable.json"),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Simulator websocket endpoint.
    pub ws_url: String,
    pub policy: PolicyKind,
    /// Pause after each command before the next receive.
    pub step_delay: Duration,
    /// Overall session deadline; `None` runs until the server ends it.
    pub session_timeout: Option<Duration>,
    pub rl: RlConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "dronepilot-cfg-v1",
            ws_url: "ws://localhost:8765".to_string(),
            policy: PolicyKind::Rule,
            step_delay: Duration::from_millis(500),
            session_timeout: None,
            rl: RlConfig::default(),
        }
    }
}

fn env_parse<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(err) => {
            eprintln!("[config] WARN: could not parse {name} = {raw:?} ({err}); using default");
            None
        }
    }
}

impl Config {
    /// Default config with environment overrides applied:
    ///   - DRONEPILOT_WS_URL             (string)
    ///   - DRONEPILOT_POLICY             (rule | rl)
    ///   - DRONEPILOT_STEP_DELAY_MS      (u64)
    ///   - DRONEPILOT_SESSION_TIMEOUT_MS (u64; 0 disables)
    ///   - DRONEPILOT_EPSILON            (f64, clamped to [0, 1])
    ///   - DRONEPILOT_ALPHA              (f64, clamped to [0, 1])
    ///   - DRONEPILOT_GAMMA              (f64, clamped to [0, 1])
    ///   - DRONEPILOT_QTABLE_PATH        (path)
    ///   - DRONEPILOT_SEED               (u64)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Ok(url) = env::var("DRONEPILOT_WS_URL") {
            if !url.trim().is_empty() {
                cfg.ws_url = url.trim().to_string();
                eprintln!("[config] DRONEPILOT_WS_URL = {} (overrode default)", cfg.ws_url);
            }
        }

        if let Ok(raw) = env::var("DRONEPILOT_POLICY") {
            match PolicyKind::parse(&raw) {
                Some(p) => {
                    cfg.policy = p;
                    eprintln!("[config] DRONEPILOT_POLICY = {} (overrode default)", p.as_str());
                }
                None => eprintln!(
                    "[config] WARN: unknown DRONEPILOT_POLICY = {:?}; using {}",
                    raw,
                    cfg.policy.as_str()
                ),
            }
        }

        if let Some(ms) = env_parse::<u64>("DRONEPILOT_STEP_DELAY_MS") {
            cfg.step_delay = Duration::from_millis(ms);
            eprintln!("[config] DRONEPILOT_STEP_DELAY_MS = {ms} (overrode default)");
        }

        if let Some(ms) = env_parse::<u64>("DRONEPILOT_SESSION_TIMEOUT_MS") {
            cfg.session_timeout = (ms > 0).then(|| Duration::from_millis(ms));
            eprintln!("[config] DRONEPILOT_SESSION_TIMEOUT_MS = {ms} (overrode default)");
        }

        if let Some(v) = env_parse::<f64>("DRONEPILOT_EPSILON") {
            cfg.rl.epsilon = v.clamp(0.0, 1.0);
            eprintln!("[config] DRONEPILOT_EPSILON = {} (overrode default)", cfg.rl.epsilon);
        }
        if let Some(v) = env_parse::<f64>("DRONEPILOT_ALPHA") {
            cfg.rl.alpha = v.clamp(0.0, 1.0);
            eprintln!("[config] DRONEPILOT_ALPHA = {} (overrode default)", cfg.rl.alpha);
        }
        if let Some(v) = env_parse::<f64>("DRONEPILOT_GAMMA") {
            cfg.rl.gamma = v.clamp(0.0, 1.0);
            eprintln!("[config] DRONEPILOT_GAMMA = {} (overrode default)", cfg.rl.gamma);
        }

        if let Ok(path) = env::var("DRONEPILOT_QTABLE_PATH") {
            if !path.trim().is_empty() {
                cfg.rl.qtable_path = PathBuf::from(path.trim());
                eprintln!(
                    "[config] DRONEPILOT_QTABLE_PATH = {} (overrode default)",
                    cfg.rl.qtable_path.display()
                );
            }
        }

        if let Some(seed) = env_parse::<u64>("DRONEPILOT_SEED") {
            cfg.rl.seed = Some(seed);
            eprintln!("[config] DRONEPILOT_SEED = {seed} (overrode default)");
        }

        cfg
    }

    /// One-line run header.
    pub fn summary(&self) -> String {
        let timeout = self
            .session_timeout
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "none".to_string());
        let mut line = format!(
            "dronepilot | cfg={} | policy={} | url={} | step_delay={}ms | timeout={}",
            self.version,
            self.policy.as_str(),
            self.ws_url,
            self.step_delay.as_millis(),
            timeout,
        );
        if self.policy == PolicyKind::Rl {
            line.push_str(&format!(
                " | epsilon={} alpha={} gamma={} qtable={} seed={}",
                self.rl.epsilon,
                self.rl.alpha,
                self.rl.gamma,
                self.rl.qtable_path.display(),
                self.rl
                    .seed
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "entropy".to_string()),
            ));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 9] = [
        "DRONEPILOT_WS_URL",
        "DRONEPILOT_POLICY",
        "DRONEPILOT_STEP_DELAY_MS",
        "DRONEPILOT_SESSION_TIMEOUT_MS",
        "DRONEPILOT_EPSILON",
        "DRONEPILOT_ALPHA",
        "DRONEPILOT_GAMMA",
        "DRONEPILOT_QTABLE_PATH",
        "DRONEPILOT_SEED",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_match_simulator_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.ws_url, "ws://localhost:8765");
        assert_eq!(cfg.policy, PolicyKind::Rule);
        assert_eq!(cfg.step_delay, Duration::from_millis(500));
        assert_eq!(cfg.session_timeout, None);
        assert_eq!(cfg.rl.epsilon, 0.1);
        assert_eq!(cfg.rl.alpha, 0.1);
        assert_eq!(cfg.rl.gamma, 0.9);
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("DRONEPILOT_POLICY", "RL");
        env::set_var("DRONEPILOT_STEP_DELAY_MS", "25");
        env::set_var("DRONEPILOT_SESSION_TIMEOUT_MS", "0");
        env::set_var("DRONEPILOT_EPSILON", "2.5");
        env::set_var("DRONEPILOT_QTABLE_PATH", "/tmp/q.json");
        env::set_var("DRONEPILOT_SEED", "9");

        let cfg = Config::from_env();
        clear_env();

        assert_eq!(cfg.policy, PolicyKind::Rl);
        assert_eq!(cfg.step_delay, Duration::from_millis(25));
        assert_eq!(cfg.session_timeout, None);
        assert_eq!(cfg.rl.epsilon, 1.0);
        assert_eq!(cfg.rl.qtable_path, PathBuf::from("/tmp/q.json"));
        assert_eq!(cfg.rl.seed, Some(9));
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("DRONEPILOT_POLICY", "autopilot");
        env::set_var("DRONEPILOT_ALPHA", "fast");

        let cfg = Config::from_env();
        clear_env();

        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn policy_names_parse_case_insensitively() {
        assert_eq!(PolicyKind::parse(" Rule "), Some(PolicyKind::Rule));
        assert_eq!(PolicyKind::parse("Q-Learning"), Some(PolicyKind::Rl));
        assert_eq!(PolicyKind::parse("pid"), None);
    }
}
