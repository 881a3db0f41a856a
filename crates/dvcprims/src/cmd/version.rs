use dvcprims_channel::MAX_CHANNEL_NAME_LEN;
use dvcprims_frame::{DEFAULT_MAX_FRAME_PAYLOAD, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("dvcprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: dvcprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("DVCPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: channel={}, cli=true", cfg!(feature = "channel"));
    println!(
        "framing: header={HEADER_SIZE} max_frame_payload={DEFAULT_MAX_FRAME_PAYLOAD} max_message_size={DEFAULT_MAX_MESSAGE_SIZE} max_name_len={MAX_CHANNEL_NAME_LEN}"
    );

    Ok(SUCCESS)
}
