use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use tasklane_shared::{
  Sector,
  UserId
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime;
use crate::store::{
  StoreSettings,
  TRASH_RETENTION_DAYS
};

const RC_ENV_VAR: &str = "TASKLANERC";
const RC_FILE_NAME: &str = ".tasklanerc";
const SECTOR_PREFIX: &str = "sector.";

/// Flat `key = value` settings read from
/// the rc file, its includes, and any
/// command-line overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map:              BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = BTreeMap::new();
    map.insert(
      "data.location".to_string(),
      "~/.tasklane".to_string()
    );
    map.insert(
      "trash.retention_days"
        .to_string(),
      TRASH_RETENTION_DAYS.to_string()
    );
    map.insert(
      "timezone".to_string(),
      datetime::DEFAULT_TIMEZONE
        .to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override)? {
      | Some(path) => {
        info!(rc = %path.display(), "loading rc file");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no rc file found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      debug!(key = %key, value = %value, "applying override");
      self.map.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| is_truthy(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// `user.id`, when set to something
  /// non-blank.
  pub fn user_id(
    &self
  ) -> Option<UserId> {
    self
      .get("user.id")
      .map(|id| id.trim().to_string())
      .filter(|id| !id.is_empty())
  }

  pub fn timezone(
    &self
  ) -> anyhow::Result<Tz> {
    let raw = self
      .get("timezone")
      .unwrap_or_else(|| {
        datetime::DEFAULT_TIMEZONE
          .to_string()
      });
    datetime::parse_timezone(&raw)
      .context("invalid timezone setting")
  }

  /// Every `sector.<id> = <label>` entry,
  /// ordered by id.
  pub fn sectors(&self) -> Vec<Sector> {
    self
      .map
      .iter()
      .filter_map(|(key, label)| {
        let id = key
          .strip_prefix(SECTOR_PREFIX)?
          .trim();
        (!id.is_empty())
          .then(|| Sector::new(id, label.trim()))
      })
      .collect()
  }

  pub fn store_settings(
    &self
  ) -> anyhow::Result<StoreSettings> {
    let trash_retention_days = match self
      .get("trash.retention_days")
    {
      | Some(raw) => {
        let days: i64 =
          raw.trim().parse().with_context(
            || {
              format!(
                "trash.retention_days \
                 must be a whole number, \
                 got '{raw}'"
              )
            }
          )?;
        if days < 0 {
          return Err(anyhow!(
            "trash.retention_days \
             cannot be negative"
          ));
        }
        days
      }
      | None => TRASH_RETENTION_DAYS
    };

    Ok(StoreSettings {
      trash_retention_days,
      sectors: self.sectors()
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (idx, raw) in
      text.lines().enumerate()
    {
      let line = raw
        .split_once('#')
        .map_or(raw, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(included) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            included.trim()
          )?;
        if include_path == path {
          warn!(file = %path.display(), "rc file includes itself; skipping");
          continue;
        }
        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "skipping missing rc include");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            idx + 1,
            raw
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "rc key set");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => {
      let raw = cfg
        .get("data.location")
        .unwrap_or_else(|| {
          "~/.tasklane".to_string()
        });
      expand_tilde(Path::new(&raw))
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "data directory missing; creating it");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(raw) =
    std::env::var(RC_ENV_VAR)
  {
    let raw = raw.trim();
    if raw.is_empty()
      || raw == "/dev/null"
    {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(raw)));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate =
    home.join(RC_FILE_NAME);
  Ok(candidate.exists().then_some(candidate))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    return Err(anyhow!(
      "include needs a path"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn is_truthy(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  fn write_rc(
    dir: &Path,
    name: &str,
    body: &str
  ) -> PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path)
      .expect("create rc file");
    file
      .write_all(body.as_bytes())
      .expect("write rc file");
    path
  }

  #[test]
  fn reads_keys_comments_and_includes() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    write_rc(
      dir.path(),
      "sectors.rc",
      "sector.general = Geral\n\
       sector.ops = Operations # on call\n"
    );
    let rc = write_rc(
      dir.path(),
      "main.rc",
      "# tasklane\n\
       user.id = u-7\n\
       trash.retention_days = 14\n\
       include sectors.rc\n"
    );

    let cfg = Config::load(Some(&rc))
      .expect("load rc");

    assert_eq!(
      cfg.user_id().as_deref(),
      Some("u-7")
    );
    let settings = cfg
      .store_settings()
      .expect("settings");
    assert_eq!(
      settings.trash_retention_days,
      14
    );
    let ids: Vec<&str> = settings
      .sectors
      .iter()
      .map(|s| s.id.as_str())
      .collect();
    assert_eq!(ids, vec!["general", "ops"]);
    assert_eq!(
      settings.sectors[1].label,
      "Operations"
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn overrides_win_over_file_values() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "user.id".to_string(),
      "  ".to_string()
    )]);
    assert_eq!(cfg.user_id(), None);

    cfg.apply_overrides(vec![(
      "color".to_string(),
      "off".to_string()
    )]);
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
  }

  #[test]
  fn rejects_bad_retention() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "trash.retention_days"
        .to_string(),
      "soon".to_string()
    )]);
    assert!(
      cfg.store_settings().is_err()
    );
  }

  #[test]
  fn malformed_line_reports_location() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let rc = write_rc(
      dir.path(),
      "broken.rc",
      "user.id = u-1\nnot a setting\n"
    );
    let err = Config::load(Some(&rc))
      .expect_err("malformed rc");
    assert!(
      err.to_string().contains(":2:")
    );
  }
}
