use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const DEFAULT_TIMEZONE: &str =
  "UTC";

/// Parses an IANA zone id such as
/// `Europe/Lisbon`.
pub fn parse_timezone(
  raw: &str
) -> anyhow::Result<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(anyhow!(
      "timezone cannot be empty"
    ));
  }
  trimmed.parse::<Tz>().map_err(|err| {
    anyhow!(
      "unknown timezone {trimmed}: \
       {err}"
    )
  })
}

#[must_use]
pub fn format_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%Y-%m-%d")
    .to_string()
}

#[must_use]
pub fn format_datetime(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%Y-%m-%d %H:%M")
    .to_string()
}

fn to_utc(
  tz: Tz,
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz.from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      Ok(first.min(second).with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in {tz}: {context}"
      ))
    }
  }
}

fn midnight(
  tz: Tz,
  date: NaiveDate,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  let naive = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct \
         midnight for {date}"
      )
    })?;
  to_utc(tz, naive, context)
}

/// Accepts `now`, `today`, `tomorrow`,
/// `yesterday`, weekday names (the next
/// such day), `YYYY-MM-DD`,
/// `YYYY-MM-DD HH:MM`, RFC 3339 and
/// relative offsets `+Nd`, `+Nw`, `+Nh`,
/// `+Nm`. Calendar words resolve to local
/// midnight in `tz`.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today =
    now.with_timezone(&tz).date_naive();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return midnight(tz, today, "today");
    }
    | "tomorrow" => {
      return Ok(
        midnight(tz, today, "tomorrow")?
          + Duration::days(1)
      );
    }
    | "yesterday" => {
      return Ok(
        midnight(tz, today, "yesterday")?
          - Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return midnight(
      tz,
      next_weekday_date(today, weekday),
      "weekday-name"
    );
  }

  if let Some(offset) =
    parse_offset(&lower)?
  {
    return Ok(now + offset);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(naive) =
    NaiveDateTime::parse_from_str(
      token,
      "%Y-%m-%d %H:%M"
    )
  {
    return to_utc(
      tz,
      naive,
      "date-time"
    );
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return midnight(tz, date, "date");
  }

  Err(anyhow!(
    "unrecognized date expression \
     '{input}'; expected now, today, \
     tomorrow, yesterday, a weekday \
     name, +Nd/+Nw/+Nh/+Nm, \
     YYYY-MM-DD, YYYY-MM-DD HH:MM or \
     RFC3339"
  ))
}

fn parse_offset(
  token: &str
) -> anyhow::Result<Option<Duration>> {
  let offset_re = Regex::new(
    r"^\+(?P<count>\d+)(?P<unit>[dwhm])$"
  )
  .context("offset pattern")?;
  let Some(captures) =
    offset_re.captures(token)
  else {
    return Ok(None);
  };

  let count: i64 = captures["count"]
    .parse()
    .context("offset count out of range")?;
  let offset = match &captures["unit"] {
    | "d" => Duration::try_days(count),
    | "w" => Duration::try_weeks(count),
    | "h" => Duration::try_hours(count),
    | _ => Duration::try_minutes(count)
  };
  offset.map(Some).ok_or_else(|| {
    anyhow!("offset too large: {token}")
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

/// Strictly after `from`: asking for
/// today's weekday yields next week.
fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = i64::from(
    from.weekday().num_days_from_monday()
  );
  let target_idx = i64::from(
    target.num_days_from_monday()
  );
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::*;

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn utc() -> Tz {
    parse_timezone("UTC")
      .expect("utc zone")
  }

  #[test]
  fn parses_calendar_words() {
    let tomorrow = parse_date_expr(
      "tomorrow",
      now(),
      utc()
    )
    .expect("parse tomorrow");
    assert_eq!(
      format_datetime(tomorrow, utc()),
      "2026-02-18 00:00"
    );
    assert_eq!(
      parse_date_expr("NOW", now(), utc())
        .expect("parse now"),
      now()
    );
  }

  #[test]
  fn parses_weekday_name() {
    let parsed = parse_date_expr(
      "wednesday",
      now(),
      utc()
    )
    .expect("parse weekday");
    assert_eq!(
      format_date(parsed, utc()),
      "2026-02-18"
    );

    let same_day = parse_date_expr(
      "tue",
      now(),
      utc()
    )
    .expect("parse weekday");
    assert_eq!(
      format_date(same_day, utc()),
      "2026-02-24"
    );
  }

  #[test]
  fn parses_relative_offsets() {
    let parsed =
      parse_date_expr("+2w", now(), utc())
        .expect("parse offset");
    assert_eq!(
      parsed,
      now() + Duration::weeks(2)
    );
    assert!(
      parse_date_expr("+2y", now(), utc())
        .is_err()
    );
  }

  #[test]
  fn plain_dates_are_local_midnight() {
    let new_york =
      parse_timezone("America/New_York")
        .expect("known zone");
    let parsed = parse_date_expr(
      "2024-07-01",
      now(),
      new_york
    )
    .expect("parse date");
    assert_eq!(
      parsed.to_rfc3339(),
      "2024-07-01T04:00:00+00:00"
    );
  }

  #[test]
  fn rejects_unknown_zone() {
    assert!(
      parse_timezone("Mars/Olympus")
        .is_err()
    );
  }
}
