use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::common::cursor::ReadCursor;
use crate::common::frame::{Frame, FramedReader, FunctionField};
use crate::common::function::FunctionCode;
use crate::error::RequestError;
use crate::exception::ExceptionCode;
use crate::server::handler::RequestHandler;
use crate::server::request::Request;
use crate::tcp::frame::{FrameWriter, MbapParser};

async fn next_frame(
    reader: &mut FramedReader<MbapParser>,
    socket: &mut TcpStream,
    deadline: Option<Duration>,
) -> Result<Frame, RequestError> {
    match deadline {
        Some(duration) => match tokio::time::timeout(duration, reader.next_frame(socket)).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::ReadTimeout),
        },
        None => reader.next_frame(socket).await,
    }
}

/// Request loop for a single accepted connection. One request is fully
/// served, reply flushed, before the next one is read.
pub(crate) struct SessionTask<T>
where
    T: RequestHandler,
{
    socket: TcpStream,
    handler: Arc<T>,
    shutdown: tokio::sync::mpsc::Receiver<()>,
    reader: FramedReader<MbapParser>,
    writer: FrameWriter,
    read_timeout: Option<Duration>,
}

impl<T> SessionTask<T>
where
    T: RequestHandler,
{
    pub(crate) fn new(
        socket: TcpStream,
        handler: Arc<T>,
        shutdown: tokio::sync::mpsc::Receiver<()>,
        read_timeout: Option<Duration>,
    ) -> Self {
        Self {
            socket,
            handler,
            shutdown,
            reader: FramedReader::new(MbapParser::new()),
            writer: FrameWriter::new(),
            read_timeout,
        }
    }

    pub(crate) async fn run(&mut self) -> RequestError {
        loop {
            if let Err(err) = self.run_one().await {
                return err;
            }
        }
    }

    async fn run_one(&mut self) -> Result<(), RequestError> {
        let frame = {
            let Self {
                socket,
                shutdown,
                reader,
                read_timeout,
                ..
            } = self;
            tokio::select! {
                result = next_frame(reader, socket, *read_timeout) => result?,
                _ = shutdown.recv() => return Err(RequestError::Shutdown),
            }
        };
        self.reply_to_request(frame).await
    }

    async fn reply_to_request(&mut self, frame: Frame) -> Result<(), RequestError> {
        let mut cursor = ReadCursor::new(frame.payload());

        let raw_function = match cursor.read_u8() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("received an empty frame");
                return Ok(());
            }
        };

        let function = match FunctionCode::get(raw_function) {
            Some(x) => x,
            None => {
                tracing::warn!("received unknown function code: {:#04X}", raw_function);
                let reply = self.writer.format(
                    frame.header,
                    FunctionField::UnknownFunction(raw_function),
                    &ExceptionCode::IllegalFunction,
                )?;
                self.socket.write_all(reply).await?;
                return Ok(());
            }
        };

        let reply = match Request::parse(function, &mut cursor) {
            Err(err) => {
                tracing::warn!("error parsing {} request: {}", function, err);
                self.writer.format(
                    frame.header,
                    FunctionField::Exception(function),
                    &err.exception(),
                )?
            }
            Ok(request) => {
                tracing::debug!("processing {}", function);
                request.get_reply(frame.header, self.handler.as_ref(), &mut self.writer)?
            }
        };

        self.socket.write_all(reply).await?;
        Ok(())
    }
}
