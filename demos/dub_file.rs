//! Пример запуска задачи дубляжа с отслеживанием прогресса
//!
//! ```text
//! OPENAI_API_KEY=sk-... cargo run --example dub_file -- <url-or-path> [--no-captions] [--keep-audio]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use dub_sync::task::{AudioMode, SourceDescriptor, TaskOptions};
use dub_sync::{init_logger, Collaborators, DubSyncConfig, DubbingService, MemoryTaskStore, TaskStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let mut args = std::env::args().skip(1);
    let input = args.next().ok_or("usage: dub_file <url-or-path> [--no-captions] [--keep-audio]")?;
    let flags: Vec<String> = args.collect();

    let source = if input.starts_with("http://") || input.starts_with("https://") {
        SourceDescriptor::Remote { url: input }
    } else {
        SourceDescriptor::LocalFile { path: PathBuf::from(input) }
    };
    let options = TaskOptions {
        captioning: !flags.iter().any(|f| f == "--no-captions"),
        audio_mode: if flags.iter().any(|f| f == "--keep-audio") {
            AudioMode::KeepOriginal
        } else {
            AudioMode::Replace
        },
    };

    let config = DubSyncConfig::from_env()?;
    let collaborators = Collaborators::from_config(&config)?;
    let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
    let service = DubbingService::new(config, collaborators, store.clone())?;

    // Печатаем каждое обновление записи задачи
    let mut updates = store.subscribe();
    tokio::spawn(async move {
        while let Ok(record) = updates.recv().await {
            println!("[{:>3}%] {}", record.progress, record.message);
        }
    });

    let id = service.start_task(source, options)?;
    println!("Задача {} запущена", id);

    let record = service.wait(&id).await?;
    for warning in &record.warnings {
        println!("Сегмент {}: {}", warning.index, warning.message);
    }
    match service.get_output(&id) {
        Ok(path) => println!("Готово: {}", path.display()),
        Err(_) => println!("Ошибка: {}", record.error.unwrap_or_default()),
    }
    Ok(())
}
