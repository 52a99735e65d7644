use std::io::SeekFrom;

use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

const SCAN_CHUNK: usize = 1024;

/// Finds the offset where the last line of a file starts and leaves the cursor
/// there. A newline terminating the file is treated as part of the last line,
/// so `"a\nb\n"` yields the offset of `b`. Empty files yield 0.
pub async fn last_line_start(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
) -> Result<u64, io::Error> {
    let mut end = file.seek(SeekFrom::End(0)).await?;
    if end > 0 {
        file.seek(SeekFrom::Start(end - 1)).await?;
        if file.read_u8().await? == b'\n' {
            end -= 1;
        }
    }

    let mut buffer = [0u8; SCAN_CHUNK];
    while end > 0 {
        let chunk = u64::min(end, SCAN_CHUNK as u64) as usize;
        let chunk_start = end - chunk as u64;
        file.seek(SeekFrom::Start(chunk_start)).await?;
        file.read_exact(&mut buffer[..chunk]).await?;
        if let Some(index) = buffer[..chunk].iter().rposition(|byte| *byte == b'\n') {
            let start = chunk_start + index as u64 + 1;
            file.seek(SeekFrom::Start(start)).await?;
            return Ok(start);
        }
        end = chunk_start;
    }

    file.seek(SeekFrom::Start(0)).await?;
    Ok(0)
}

/// Checks whether the file is empty or ends with a newline, so that a line can
/// be appended without gluing it to a line cut short by a crash. Leaves the
/// cursor at the end of the file.
pub async fn ends_with_newline(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
) -> Result<bool, io::Error> {
    let len = file.seek(SeekFrom::End(0)).await?;
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1)).await?;
    Ok(file.read_u8().await? == b'\n')
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use tempfile::tempfile;
    use tokio::io::AsyncReadExt;

    use super::{ends_with_newline, last_line_start};

    async fn file_with(content: &str) -> Result<tokio::fs::File> {
        let mut file = tempfile()?;
        file.write_all(content.as_bytes())?;
        Ok(tokio::fs::File::from_std(file))
    }

    #[tokio::test]
    async fn test_last_line_start_basic() -> Result<()> {
        let mut file = file_with("first line\nsecond line\nthird line\n").await?;
        let start = last_line_start(&mut file).await?;
        assert_eq!(start, 23);

        let mut rest = String::new();
        file.read_to_string(&mut rest).await?;
        assert_eq!(rest, "third line\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_last_line_start_without_trailing_newline() -> Result<()> {
        let mut file = file_with("first\nunfinished").await?;
        assert_eq!(last_line_start(&mut file).await?, 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_last_line_start_single_and_empty() -> Result<()> {
        let mut file = file_with("only\n").await?;
        assert_eq!(last_line_start(&mut file).await?, 0);

        let mut file = file_with("").await?;
        assert_eq!(last_line_start(&mut file).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_last_line_start_long_lines() -> Result<()> {
        let long = "x".repeat(3000);
        let mut file = file_with(&format!("{long}\n{long}\n")).await?;
        assert_eq!(last_line_start(&mut file).await?, 3001);
        Ok(())
    }

    #[tokio::test]
    async fn test_ends_with_newline() -> Result<()> {
        assert!(ends_with_newline(&mut file_with("").await?).await?);
        assert!(ends_with_newline(&mut file_with("a\n").await?).await?);
        assert!(!ends_with_newline(&mut file_with("a\nb").await?).await?);
        Ok(())
    }
}
