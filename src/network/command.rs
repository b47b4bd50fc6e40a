use std::fmt;

use crate::error::{Result, SyncError};

// Response sentinels
pub const READY: &str = "!dd";
pub const FAILED: &str = "!fail";
pub const YES: &str = "!Yes";
pub const NO: &str = "!No";
pub const NOT_RECOGNIZED: &str = "NotRecognized";
/// `!getFileInfo` answer for a missing file
pub const ABSENT_INFO: &str = "-";

/// Separator of the paths and hashes of `!getHashes`
pub const HASH_SEPARATOR: char = '?';

// Verb literals
const QUIT: &str = "!qq";
const GET_HASHES: &str = "!getHashes";
const GET_FILE: &str = "!getFile";
const CATCH_FILE: &str = "!catchFile";
const EXISTS: &str = "!exists";
const GET_FILE_LIST: &str = "!getFileList";
const SESSION_DONE: &str = "!sessiondone";
const REMOVE: &str = "!rm";
const GET_FILE_INFO: &str = "!getFileInfo";

/// One decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    GetHashes(Vec<String>),
    GetFile(String),
    CatchFile(String),
    Exists(String),
    GetFileList,
    SessionDone,
    Remove(String),
    GetFileInfo(String),
}

impl Command {
    /// Decode a request payload.
    ///
    /// The verb is everything up to the first space and must match a verb
    /// literal exactly; the rest, spaces included, is the argument.
    pub fn parse(payload: &str) -> Result<Command> {
        let payload = payload.trim_end_matches(['\r', '\n', '\0']);
        let (verb, argument) = match payload.split_once(' ') {
            Some((verb, argument)) => (verb, Some(argument)),
            None => (payload, None),
        };

        let path = |argument: Option<&str>| match argument {
            Some(path) if !path.trim().is_empty() => Ok(path.to_string()),
            _ => Err(SyncError::Protocol(format!("{} needs a relative path", verb))),
        };
        let bare = |command: Command| match argument {
            None => Ok(command),
            Some(_) => Err(SyncError::Protocol(format!("{} takes no argument", verb))),
        };

        match verb {
            QUIT => bare(Command::Quit),
            GET_FILE_LIST => bare(Command::GetFileList),
            SESSION_DONE => bare(Command::SessionDone),
            GET_HASHES => Ok(Command::GetHashes(
                argument
                    .unwrap_or_default()
                    .split(HASH_SEPARATOR)
                    .filter(|path| !path.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            GET_FILE => path(argument).map(Command::GetFile),
            CATCH_FILE => path(argument).map(Command::CatchFile),
            EXISTS => path(argument).map(Command::Exists),
            REMOVE => path(argument).map(Command::Remove),
            GET_FILE_INFO => path(argument).map(Command::GetFileInfo),
            _ => Err(SyncError::Protocol(format!("Unknown verb: {}", verb))),
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Quit => QUIT,
            Command::GetHashes(_) => GET_HASHES,
            Command::GetFile(_) => GET_FILE,
            Command::CatchFile(_) => CATCH_FILE,
            Command::Exists(_) => EXISTS,
            Command::GetFileList => GET_FILE_LIST,
            Command::SessionDone => SESSION_DONE,
            Command::Remove(_) => REMOVE,
            Command::GetFileInfo(_) => GET_FILE_INFO,
        }
    }

    /// Request payload for this command
    pub fn encode(&self) -> String {
        match self {
            Command::Quit | Command::GetFileList | Command::SessionDone => self.verb().to_string(),
            Command::GetHashes(paths) => {
                let separator = HASH_SEPARATOR.to_string();
                format!("{} {}", self.verb(), paths.join(separator.as_str()))
            }
            Command::GetFile(path)
            | Command::CatchFile(path)
            | Command::Exists(path)
            | Command::Remove(path)
            | Command::GetFileInfo(path) => format!("{} {}", self.verb(), path),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::GetHashes(paths) => write!(f, "{} ({} paths)", self.verb(), paths.len()),
            _ => write!(f, "{}", self.encode()),
        }
    }
}

/// Split a `!getHashes` response back into one entry per requested path
pub fn split_hashes(response: &str, expected: usize) -> Result<Vec<String>> {
    let hashes: Vec<String> = if expected == 0 {
        Vec::new()
    } else {
        response.split(HASH_SEPARATOR).map(str::to_string).collect()
    };
    if hashes.len() != expected {
        return Err(SyncError::Protocol(format!(
            "Expected {} hashes, got {}",
            expected,
            hashes.len()
        )));
    }
    Ok(hashes)
}

/// Split a `!getFileList` response into relative paths
pub fn split_file_list(response: &str) -> Vec<String> {
    response
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_verb() {
        assert_eq!(Command::parse("!qq").unwrap(), Command::Quit);
        assert_eq!(Command::parse("!getFileList").unwrap(), Command::GetFileList);
        assert_eq!(Command::parse("!sessiondone").unwrap(), Command::SessionDone);
        assert_eq!(
            Command::parse("!getHashes a.txt?dir/b.txt").unwrap(),
            Command::GetHashes(vec!["a.txt".into(), "dir/b.txt".into()])
        );
        assert_eq!(
            Command::parse("!getFile dir/my file.txt").unwrap(),
            Command::GetFile("dir/my file.txt".into())
        );
        assert_eq!(
            Command::parse("!catchFile x").unwrap(),
            Command::CatchFile("x".into())
        );
        assert_eq!(Command::parse("!exists x").unwrap(), Command::Exists("x".into()));
        assert_eq!(Command::parse("!rm x").unwrap(), Command::Remove("x".into()));
        assert_eq!(
            Command::parse("!getFileInfo x").unwrap(),
            Command::GetFileInfo("x".into())
        );
    }

    #[test]
    fn verbs_match_by_identity_not_containment() {
        // A path named like another verb stays a path
        assert_eq!(
            Command::parse("!rm !getFileList").unwrap(),
            Command::Remove("!getFileList".into())
        );
        assert_eq!(
            Command::parse("!getFile !qq").unwrap(),
            Command::GetFile("!qq".into())
        );
        // Prefixes of longer verbs are not those verbs
        assert!(Command::parse("!getFileListing").is_err());
        assert!(Command::parse("!getFileInfox a").is_err());
        assert!(Command::parse("please !qq").is_err());
    }

    #[test]
    fn malformed_commands_are_protocol_errors() {
        assert!(matches!(Command::parse(""), Err(SyncError::Protocol(_))));
        assert!(matches!(Command::parse("!getFile"), Err(SyncError::Protocol(_))));
        assert!(matches!(Command::parse("!getFile  "), Err(SyncError::Protocol(_))));
        assert!(matches!(Command::parse("!qq now"), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn get_hashes_skips_empty_segments() {
        assert_eq!(
            Command::parse("!getHashes ?a??b?").unwrap(),
            Command::GetHashes(vec!["a".into(), "b".into()])
        );
        assert_eq!(Command::parse("!getHashes").unwrap(), Command::GetHashes(vec![]));
    }

    #[test]
    fn encode_produces_wire_payloads() {
        assert_eq!(
            Command::GetHashes(vec!["a".into(), "b/c".into()]).encode(),
            "!getHashes a?b/c"
        );
        assert_eq!(Command::CatchFile("x y".into()).encode(), "!catchFile x y");
        assert_eq!(Command::SessionDone.encode(), "!sessiondone");

        let command = Command::Remove("docs/a.txt".into());
        assert_eq!(Command::parse(&command.encode()).unwrap(), command);
    }

    #[test]
    fn hash_responses_must_line_up_with_the_request() {
        assert_eq!(
            split_hashes("h1?-?h3", 3).unwrap(),
            vec!["h1".to_string(), "-".to_string(), "h3".to_string()]
        );
        assert!(split_hashes("h1", 2).is_err());
        assert!(split_hashes("", 0).unwrap().is_empty());
    }

    #[test]
    fn file_list_split_ignores_blank_lines() {
        assert!(split_file_list("").is_empty());
        assert_eq!(
            split_file_list("a.txt\nsub/b.txt\n"),
            vec!["a.txt".to_string(), "sub/b.txt".to_string()]
        );
    }
}
