use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "hamlet-server", about = "Local server for the Hamlet city builder")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "HAMLET_ADDR", default_value = "127.0.0.1:39333")]
    pub addr: SocketAddr,

    /// SQLite database file. Defaults to ~/.hamlet/hamlet.db.
    #[arg(long, env = "HAMLET_DB")]
    pub db: Option<PathBuf>,

    /// Drawing surface width in pixels.
    #[arg(long, env = "HAMLET_WIDTH", default_value_t = 800)]
    pub width: u32,

    /// Drawing surface height in pixels.
    #[arg(long, env = "HAMLET_HEIGHT", default_value_t = 600)]
    pub height: u32,

    /// Frames per second of the animator.
    #[arg(long, env = "HAMLET_FPS", default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: u32,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".hamlet")
                .join("hamlet.db")
        })
    }

    pub fn surface(&self) -> (f64, f64) {
        (self.width as f64, self.height as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dashboard_canvas() {
        let cfg = Config::parse_from(["hamlet-server"]);
        assert_eq!(cfg.surface(), (800.0, 600.0));
        assert_eq!(cfg.fps, 60);
        assert_eq!(cfg.addr.port(), 39333);
        assert!(cfg.db_path().ends_with(".hamlet/hamlet.db"));
    }

    #[test]
    fn explicit_db_path_wins() {
        let cfg = Config::parse_from(["hamlet-server", "--db", "/tmp/x.db", "--fps", "30"]);
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.fps, 30);
    }

    #[test]
    fn zero_fps_is_rejected() {
        assert!(Config::try_parse_from(["hamlet-server", "--fps", "0"]).is_err());
    }
}
