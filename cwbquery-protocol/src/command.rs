use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{ProtocolError, Result};

/// Begin-time format understood by the query server.
pub const BEGIN_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Query commands sent to a CWB/Edge query server.
///
/// Each argument is single-quoted. A data query ends with a tab so further
/// queries can share the connection; the channel list query ends the line.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryCommand {
    /// miniSEED records for `duration` seconds from `begin` matching the
    /// NSCL `selector` (wildcards allowed, checked by the server).
    MiniSeed {
        begin: DateTime<Utc>,
        duration: f64,
        selector: String,
    },
    /// Channels with data in the window.
    ListChannels { begin: DateTime<Utc>, duration: f64 },
}

impl QueryCommand {
    pub fn mini_seed(begin: DateTime<Utc>, duration: f64, selector: &str) -> Result<Self> {
        check_duration(duration)?;
        Ok(Self::MiniSeed {
            begin,
            duration,
            selector: selector.to_owned(),
        })
    }

    pub fn list_channels(begin: DateTime<Utc>, duration: f64) -> Result<Self> {
        check_duration(duration)?;
        Ok(Self::ListChannels { begin, duration })
    }

    /// Render the command text, terminator included.
    pub fn to_line(&self) -> String {
        match self {
            Self::MiniSeed {
                begin,
                duration,
                selector,
            } => format!(
                "'-b' '{}' '-s' '{selector}' '-d' '{duration}'\t",
                begin.format(BEGIN_FORMAT)
            ),
            Self::ListChannels { begin, duration } => format!(
                "'-b' '{}' '-d' '{duration}' '-lsc'\n",
                begin.format(BEGIN_FORMAT)
            ),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_line().into_bytes()
    }

    /// Parse a command line as a server would see it.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\t', '\n', '\r']);
        let args = split_quoted(line)?;

        let mut begin = None;
        let mut duration = None;
        let mut selector = None;
        let mut list = false;

        let mut it = args.into_iter();
        while let Some(flag) = it.next() {
            match flag.as_str() {
                "-b" => {
                    let value = it.next().ok_or_else(|| missing("-b"))?;
                    let naive = NaiveDateTime::parse_from_str(&value, BEGIN_FORMAT)
                        .map_err(|e| ProtocolError::InvalidCommand(format!("-b {value:?}: {e}")))?;
                    begin = Some(naive.and_utc());
                }
                "-d" => {
                    let value = it.next().ok_or_else(|| missing("-d"))?;
                    let secs: f64 = value.parse().map_err(|_| {
                        ProtocolError::InvalidCommand(format!("-d {value:?}: not a number"))
                    })?;
                    duration = Some(secs);
                }
                "-s" => selector = Some(it.next().ok_or_else(|| missing("-s"))?),
                "-lsc" | "-ls" => list = true,
                other => {
                    return Err(ProtocolError::InvalidCommand(format!(
                        "unknown option {other:?}"
                    )));
                }
            }
        }

        let begin = begin.ok_or_else(|| missing("-b"))?;
        let duration = duration.ok_or_else(|| missing("-d"))?;
        if list {
            Self::list_channels(begin, duration)
        } else {
            let selector = selector.ok_or_else(|| missing("-s"))?;
            Self::mini_seed(begin, duration, &selector)
        }
    }
}

fn check_duration(duration: f64) -> Result<()> {
    if duration.is_finite() && duration > 0.0 {
        Ok(())
    } else {
        Err(ProtocolError::InvalidDuration(duration))
    }
}

fn missing(flag: &str) -> ProtocolError {
    ProtocolError::InvalidCommand(format!("{flag} requires a value"))
}

/// Split `'a' 'b c' 'd'` into its quoted arguments.
fn split_quoted(line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        let body = rest.strip_prefix('\'').ok_or_else(|| {
            ProtocolError::InvalidCommand(format!("expected quoted argument at {rest:?}"))
        })?;
        let end = body
            .find('\'')
            .ok_or_else(|| ProtocolError::InvalidCommand("unterminated quote".into()))?;
        args.push(body[..end].to_owned());
        rest = body[end + 1..].trim_start();
    }
    Ok(args)
}
