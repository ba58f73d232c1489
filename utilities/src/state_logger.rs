use crate::logger::{error, trace};
use crate::result::Result;
use serde::Serialize;
use std::path::Path;
use tokio::{
    io::AsyncWriteExt,
    sync::mpsc::{self, Receiver, Sender},
};

/// Appends a json line to a file every time the received state differs from
/// the last one written. Producers push states through the returned channel
/// and never wait on file io.
pub struct StateLogger<T, U>
where
    T: PartialEq + Serialize + Send + Sync + 'static,
    U: Into<T> + Send + Sync + 'static,
{
    current_state: T,
    file: tokio::fs::File,
    receiver: Receiver<U>,
}

impl<T, U> StateLogger<T, U>
where
    T: PartialEq + Serialize + Send + Sync + 'static,
    U: Into<T> + Send + Sync + 'static,
{
    /// Writes `state` as the first line and spawns the writer task.
    pub async fn start(state: U, target_file_path: &Path) -> Result<Sender<U>> {
        if let Some(parent) = target_file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::options()
            .append(true)
            .create(true)
            .open(target_file_path)
            .await?;
        let (tx, rx) = mpsc::channel::<U>(10);
        let mut state_logger = Self {
            current_state: state.into(),
            file,
            receiver: rx,
        };
        state_logger.write_current().await?;
        tokio::spawn(async move {
            while let Some(new_state) = state_logger.receiver.recv().await {
                let state = new_state.into();
                if state == state_logger.current_state {
                    continue;
                }
                state_logger.current_state = state;
                match state_logger.write_current().await {
                    Ok(_) => {
                        trace!("state snapshot written");
                    }
                    Err(e) => {
                        error!(error = %e, "Error while writing the state snapshot");
                    }
                }
            }
        });
        Ok(tx)
    }

    async fn write_current(&mut self) -> Result<()> {
        let mut json_line = serde_json::to_vec(&self.current_state)?;
        json_line.push(b'\n');
        self.file.write_all(&json_line).await?;
        self.file.flush().await?;
        Ok(())
    }
}
