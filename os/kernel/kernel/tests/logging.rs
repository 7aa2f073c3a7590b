mod common;

use bootimage_abi::BootImageBuilder;
use common::test_kernel;
use kernel::{BANNER, FatalError, KernelError};
use kernel_log::{BufferSink, KernelLogger};
use log::LevelFilter;

static LOGGER: KernelLogger<BufferSink<8192>> =
    KernelLogger::new(BufferSink::new(), LevelFilter::Info);

// One test: the logger is process-wide.
#[test]
fn run_logs_banner_and_loaded_programs() {
    LOGGER.install().unwrap();

    let image = BootImageBuilder::new()
        .program("init", 0x1000, false)
        .data("motd")
        .build();
    let mut kernel = test_kernel(&image);
    assert_eq!(
        kernel.run(),
        KernelError::Fatal(FatalError::SchedulerReturned)
    );

    let output = LOGGER.with_sink(|sink| sink.as_str().to_owned());
    assert!(output.contains(&format!("{BANNER}\n")), "{output}");
    assert!(output.contains("loaded: init"), "{output}");
    assert!(!output.contains("loaded: motd"), "{output}");
    let fatal = "[ERROR] fatal: scheduler returned";
    assert!(output.contains(fatal), "{output}");

    let banner = output.find(BANNER).unwrap();
    let loaded = output.find("loaded: init").unwrap();
    assert!(banner < loaded);
}
