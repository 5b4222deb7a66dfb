//! Delegates removal to an external program over stdin/stdout.
//!
//! The default invocation is `rembg i - -`: a PNG goes in on stdin, a PNG
//! with the background removed comes out on stdout. Any program honouring
//! that contract works.

use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::{RemoveError, Remover};

/// How much of the child's stderr is kept in error messages.
const STDERR_EXCERPT: usize = 512;

/// Runs one process per image. No retries, no timeout: a hung child blocks
/// the calling worker until the transport gives up.
#[derive(Debug, Clone)]
pub struct CommandRemover {
    program: String,
    args: Vec<String>,
}

impl CommandRemover {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `rembg i - -`
    pub fn rembg() -> Self {
        Self::new("rembg", vec!["i".into(), "-".into(), "-".into()])
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Remover for CommandRemover {
    fn remove(&self, image: &DynamicImage) -> Result<DynamicImage, RemoveError> {
        let start = Instant::now();

        let mut input = Vec::new();
        image.write_to(&mut Cursor::new(&mut input), ImageFormat::Png)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| RemoveError::Command(format!("failed to spawn {}: {err}", self.program)))?;

        // Feed stdin from another thread so a child that starts writing before
        // it has read everything can't deadlock us on a full pipe.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RemoveError::Command("child stdin unavailable".into()))?;
        let writer = thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output()?;
        let write_result = writer
            .join()
            .map_err(|_| RemoveError::Command("stdin writer panicked".into()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            return Err(RemoveError::Command(format!(
                "{} exited with {}: {excerpt}",
                self.program, output.status
            )));
        }
        // Only worth reporting when the child otherwise looked healthy.
        write_result?;

        if output.stdout.is_empty() {
            return Err(RemoveError::Command(format!(
                "{} produced no output",
                self.program
            )));
        }

        let result = image::load_from_memory(&output.stdout)?;
        debug!(
            program = %self.program,
            elapsed_ms = start.elapsed().as_millis(),
            output_bytes = output.stdout.len(),
            "command_remover_done"
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])))
    }

    #[test]
    fn cat_round_trips_the_png() {
        let remover = CommandRemover::new("cat", Vec::new());
        let out = remover.remove(&sample()).unwrap();
        assert_eq!((out.width(), out.height()), (4, 3));
        assert_eq!(out.to_rgb8().get_pixel(0, 0).0, [1, 2, 3]);
    }

    #[test]
    fn missing_program_is_a_command_error() {
        let remover = CommandRemover::new("definitely-not-a-real-binary-bgrelay", Vec::new());
        let err = remover.remove(&sample()).unwrap_err();
        assert!(matches!(err, RemoveError::Command(_)));
    }

    #[test]
    fn nonzero_exit_includes_stderr() {
        let remover = CommandRemover::new(
            "sh",
            vec!["-c".into(), "cat >/dev/null; echo boom >&2; exit 3".into()],
        );
        let err = remover.remove(&sample()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("boom"), "{msg}");
    }

    #[test]
    fn empty_output_is_rejected() {
        let remover = CommandRemover::new("sh", vec!["-c".into(), "cat >/dev/null".into()]);
        assert!(matches!(
            remover.remove(&sample()),
            Err(RemoveError::Command(_))
        ));
    }

    #[test]
    fn garbage_output_is_a_codec_error() {
        let remover = CommandRemover::new(
            "sh",
            vec!["-c".into(), "cat >/dev/null; printf 'not an image'".into()],
        );
        assert!(matches!(
            remover.remove(&sample()),
            Err(RemoveError::Codec(_))
        ));
    }
}
