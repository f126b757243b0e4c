use std::{
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use bytes::Bytes;
use net::Endpoint;
use runtime::{
    RecorderConfig,
    ServerConfig,
    SessionConfig,
    WatchdogConfig,
};

/// Login payload, given on the command line as hex.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthKey(pub Bytes);

impl FromStr for AuthKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(|raw| Self(raw.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, structopt::StructOpt)]
#[structopt(name = "ipscgate", about = "Dispatcher gateway for DMR radios")]
pub struct Options {
    /// Control address of the radio.
    #[structopt(long, default_value = "127.0.0.1:50000")]
    pub radio: Endpoint,

    #[structopt(long, default_value = "1")]
    pub dispatcher_id: u32,

    /// Login payload as hex.
    #[structopt(long, default_value = "")]
    pub auth: AuthKey,

    /// Address dispatcher clients connect to.
    #[structopt(long, default_value = "0.0.0.0:30001")]
    pub listen: SocketAddr,

    #[structopt(long, parse(from_os_str), default_value = "./recordings")]
    pub recordings: PathBuf,

    /// Don't record calls.
    #[structopt(long)]
    pub no_record: bool,

    /// Seconds a PTT may be held before it is released automatically.
    #[structopt(long, default_value = "180")]
    pub ptt_timeout: u64,

    /// Seconds to wait for the radio to answer a login.
    #[structopt(long, default_value = "5")]
    pub login_timeout: u64,

    /// Human-friendly multi-line log output.
    #[structopt(long)]
    pub pretty: bool,
}

impl Options {
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            endpoint: self.radio.clone(),
            dispatcher_id: self.dispatcher_id,
            login_timeout: Duration::from_secs(self.login_timeout),
            ..Default::default()
        }
    }

    pub fn watchdog(&self) -> WatchdogConfig {
        WatchdogConfig {
            timeout: Duration::from_secs(self.ptt_timeout),
            ..Default::default()
        }
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            bind: self.listen,
            ..Default::default()
        }
    }

    pub fn recorder(&self) -> RecorderConfig {
        RecorderConfig {
            enabled:   !self.no_record,
            directory: self.recordings.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use structopt::StructOpt;

    use super::*;

    #[test]
    fn defaults() {
        let options = Options::from_iter(["ipscgate"]);

        assert_eq!(options.session().endpoint, Endpoint::new("127.0.0.1", 50000));
        assert_eq!(options.session().keepalive_interval, Duration::from_secs(10));
        assert_eq!(options.watchdog().timeout, Duration::from_secs(180));
        assert_eq!(options.server().bind.port(), 30001);
        assert!(options.recorder().enabled);
        assert_eq!(options.auth, AuthKey::default());
    }

    #[test]
    fn overrides() {
        let options = Options::from_iter([
            "ipscgate",
            "--radio",
            "10.0.0.2:50001",
            "--dispatcher-id",
            "9000001",
            "--auth",
            "c0ffee",
            "--no-record",
            "--ptt-timeout",
            "30",
        ]);

        assert_eq!(options.radio, Endpoint::new("10.0.0.2", 50001));
        assert_eq!(options.session().dispatcher_id, 9_000_001);
        assert_eq!(&options.auth.0[..], &[0xc0, 0xff, 0xee]);
        assert!(!options.recorder().enabled);
        assert_eq!(options.watchdog().timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_auth() {
        assert!(Options::from_iter_safe(["ipscgate", "--auth", "xyz"]).is_err());
    }
}
