use bytes::BytesMut;
use dvcprims_frame::encode_message;

use crate::cmd::FramesArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_layout, print_raw, FrameLayout, OutputFormat};

pub fn run(args: FramesArgs, format: OutputFormat) -> CliResult<i32> {
    let message = match args.size {
        Some(size) => vec![0u8; size],
        None => args.payload.resolve()?,
    };

    if let OutputFormat::Raw = format {
        let mut wire = BytesMut::new();
        encode_message(&message, args.max_frame_payload, &mut wire)
            .map_err(|err| frame_error("encode failed", err))?;
        print_raw(&wire);
        return Ok(SUCCESS);
    }

    let layout = FrameLayout::describe(&message, args.max_frame_payload)
        .map_err(|err| frame_error("layout failed", err))?;
    print_layout(&layout, format);
    Ok(SUCCESS)
}
