//! Typed error hierarchy for ark.
//!
//! One enum per subsystem:
//! - `WorkspaceError`: locating, creating and locking the `.ark` directory
//! - `ConfigError`: configuration keys and the home directory
//! - `StagingError`: staging store persistence
//! - `ManifestError`: fragment parsing and generation
//! - `ApplicationError`: the submission application record
//! - `HostError`: repository host REST failures
//! - `AuthError`: device authorization grant outcomes
//! - `CasError`: content-addressed storage node failures
//! - `SubmitError`: the submission state machine

use std::path::PathBuf;
use thiserror::Error;

/// Errors locating or preparing a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("{} is not a workspace (no .ark directory found); run `ark init` first", root.display())]
    NotAWorkspace { root: PathBuf },

    #[error("{} exists but is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("another ark command is running in this workspace")]
    Locked,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the user configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key '{key}' (valid keys: {valid})")]
    UnknownKey { key: String, valid: String },

    #[error("could not determine the home directory")]
    NoHome,
}

/// Errors from the staging store and the traversal engine.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to write staged files to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reading, generating or searching manifest fragments.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed fragment line {line}: '{content}' (expected '<fingerprint>  <name>')")]
    MalformedLine { line: usize, content: String },

    #[error("invalid search pattern '{0}'")]
    BadPattern(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cas(#[from] CasError),
}

/// Errors parsing or validating an application record.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("category '{0}' escapes the manifest root")]
    CategoryEscapes(String),

    #[error("filename '{0}' must be a plain name without '/' or '..'")]
    FilenameNotBase(String),

    #[error("application template repeats the '# {0}' heading")]
    DuplicateLabel(String),

    #[error("application template is missing the '# {0}' heading")]
    MissingLabel(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors talking to the repository host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("the repository host rejected the credentials")]
    Unauthorized,

    #[error("the repository host refused the request")]
    Forbidden,

    #[error("not found on the repository host")]
    NotFound,

    #[error("the repository host answered {code}: {body}")]
    Status { code: u16, body: String },

    #[error("unable to contact the repository host: {0}")]
    Unreachable(String),

    #[error("unexpected response from the repository host: {0}")]
    Decode(String),
}

/// Terminal outcomes of the device authorization grant.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no OAuth client id configured; set ARK_GITHUB_CLIENT_ID")]
    MissingClientId,

    #[error("access was denied; ark needs access to your account in order to submit")]
    AccessDenied,

    #[error("the device code was rejected by the host")]
    IncorrectDeviceCode,

    #[error("the host does not support the device code grant")]
    UnsupportedGrantType,

    #[error("the OAuth client credentials were rejected by the host")]
    IncorrectClientCredentials,

    #[error("unexpected authorization error: {0}")]
    Unexpected(String),

    #[error("prompt failed: {0}")]
    Prompt(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] anyhow::Error),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Errors from the content-addressed storage node.
#[derive(Debug, Error)]
pub enum CasError {
    #[error("unable to contact the storage node: {0}")]
    Unreachable(String),

    #[error("the storage node answered {code}: {body}")]
    Status { code: u16, body: String },

    #[error("unexpected response from the storage node: {0}")]
    Decode(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the submission state machine.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no files are currently staged, nothing to submit; use `ark stage <files>...` first")]
    NothingStaged,

    #[error("could not parse a repository owner and name from '{0}'")]
    BadRepositoryUrl(String),

    #[error("repository {0} doesn't exist")]
    RepositoryMissing(String),

    #[error("you do not have write access to {0}")]
    NoWritePermission(String),

    #[error("submission aborted")]
    Aborted,

    #[error("the application was not completed: title and commit message are required")]
    IncompleteApplication,

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error(transparent)]
    Cas(#[from] CasError),

    #[error("prompt failed: {0}")]
    Prompt(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_workspace_names_the_directory() {
        let err = WorkspaceError::NotAWorkspace {
            root: PathBuf::from("/data/set"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/set"));
        assert!(msg.contains("is not a workspace"));
    }

    #[test]
    fn malformed_line_carries_position() {
        let err = ManifestError::MalformedLine {
            line: 3,
            content: "onlyonefield".into(),
        };
        match &err {
            ManifestError::MalformedLine { line, content } => {
                assert_eq!(*line, 3);
                assert_eq!(content, "onlyonefield");
            }
            _ => panic!("Expected MalformedLine"),
        }
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn manifest_error_converts_from_cas_error() {
        let err: ManifestError = CasError::Unreachable("connection refused".into()).into();
        assert!(matches!(err, ManifestError::Cas(CasError::Unreachable(_))));
    }

    #[test]
    fn auth_error_wraps_host_error() {
        let err: AuthError = HostError::Unauthorized.into();
        assert!(matches!(err, AuthError::Host(HostError::Unauthorized)));
    }

    #[test]
    fn submit_error_converts_from_each_subsystem() {
        let host: SubmitError = HostError::NotFound.into();
        assert!(matches!(host, SubmitError::Host(HostError::NotFound)));

        let app: SubmitError = ApplicationError::CategoryEscapes("../x".into()).into();
        assert!(matches!(
            app,
            SubmitError::Application(ApplicationError::CategoryEscapes(_))
        ));

        let auth: SubmitError = AuthError::AccessDenied.into();
        assert!(matches!(auth, SubmitError::Auth(AuthError::AccessDenied)));
    }

    #[test]
    fn nothing_staged_message_is_user_facing() {
        assert!(
            SubmitError::NothingStaged
                .to_string()
                .contains("nothing to submit")
        );
    }

    #[test]
    fn unreachable_host_reads_as_unable_to_contact() {
        let err = HostError::Unreachable("timed out".into());
        assert!(err.to_string().starts_with("unable to contact"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WorkspaceError::Locked);
        assert_std_error(&ConfigError::NoHome);
        assert_std_error(&HostError::Forbidden);
        assert_std_error(&AuthError::MissingClientId);
        assert_std_error(&CasError::Decode("x".into()));
        assert_std_error(&SubmitError::Aborted);
    }
}
