use xpn_fs::flags::{O_RDONLY, O_WRONLY};
use xpn_net::{Comm, NetError};
use xpn_proto::{
    AttrReply, CloseReq, PathFlagsReq, PathReq, RenameReq, RwReply, RwReq, SetAttrReq, StatusReply,
};
use xpn_types::{Errno, FileHandle};

use super::{Dispatcher, Reply};
use crate::session::ConnectionSession;

fn unit(res: Result<(), Errno>) -> StatusReply {
    StatusReply::from_result(res.map(|()| 0))
}

impl Dispatcher {
    pub(crate) async fn open<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        session: &mut ConnectionSession,
        req: PathFlagsReq,
    ) -> Result<(), NetError> {
        let path = req.path.as_str();
        let status = match self.fs.open(path, req.flags, req.mode) {
            Ok(fd) if req.session => {
                session.track_file(fd);
                StatusReply::ok(fd.get())
            }
            Ok(fd) => unit(self.fs.close(fd)),
            Err(errno) => StatusReply::err(errno),
        };
        tracing::debug!(%path, session = req.session, ret = status.ret, "open");
        if !status.is_err() {
            self.subscribe(path);
        }
        reply.send(&status).await
    }

    pub(crate) async fn creat<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: PathFlagsReq,
    ) -> Result<(), NetError> {
        let path = req.path.as_str();
        let status = match self.fs.creat(path, req.mode) {
            Ok(fd) => unit(self.fs.close(fd)),
            Err(errno) => StatusReply::err(errno),
        };
        tracing::debug!(%path, ret = status.ret, "creat");
        if !status.is_err() {
            self.subscribe(path);
        }
        reply.send(&status).await
    }

    /// Resolve the descriptor a read or write works on.
    ///
    /// Session requests must name a descriptor this connection opened;
    /// stateless requests open the path with `flags`. The bool is true when
    /// the descriptor has to be closed afterwards. Ranges that are negative
    /// or end past `i64::MAX` are `EINVAL`.
    fn rw_handle(
        &self,
        session: &ConnectionSession,
        req: &RwReq,
        flags: i32,
    ) -> Result<(FileHandle, bool), Errno> {
        let in_range = u64::try_from(req.offset)
            .ok()
            .and_then(|offset| offset.checked_add(req.size))
            .is_some_and(|end| end <= i64::MAX as u64);
        if !in_range {
            return Err(Errno::EINVAL);
        }
        if req.session {
            if session.owns_file(req.fd) {
                Ok((req.fd, false))
            } else {
                Err(Errno::EBADF)
            }
        } else {
            Ok((self.fs.open(req.path.as_str(), flags, 0)?, true))
        }
    }

    fn release_handle(&self, fd: FileHandle, owned: bool) {
        if owned {
            if let Err(errno) = self.fs.close(fd) {
                tracing::debug!(%fd, %errno, "close after transfer failed");
            }
        }
    }

    /// Stream `req.size` bytes back as a sequence of reply headers, each
    /// followed by its data.
    pub(crate) async fn read<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        session: &mut ConnectionSession,
        req: RwReq,
    ) -> Result<(), NetError> {
        let (fd, owned) = match self.rw_handle(session, &req, O_RDONLY) {
            Ok(h) => h,
            Err(errno) => {
                return reply
                    .send(&RwReply {
                        size: -1,
                        last: true,
                        status: StatusReply::err(errno),
                    })
                    .await;
            }
        };

        let offset = req.offset as u64;
        let window = (req.size as usize).min(self.max_buffer_size);
        let mut buf = vec![0u8; window];
        let mut done = 0u64;
        let res = loop {
            let want = ((req.size - done) as usize).min(window);
            let header = match self.fs.pread(fd, &mut buf[..want], offset + done) {
                Ok(n) => {
                    done += n as u64;
                    RwReply {
                        size: n as i64,
                        last: n == 0 || done >= req.size,
                        status: StatusReply::ok(n as i64),
                    }
                }
                Err(errno) => RwReply {
                    size: -1,
                    last: true,
                    status: StatusReply::err(errno),
                },
            };
            if let Err(e) = reply.send(&header).await {
                break Err(e);
            }
            if header.size > 0 {
                if let Err(e) = reply.send_raw(&buf[..header.size as usize]).await {
                    break Err(e);
                }
            }
            if header.last {
                break Ok(());
            }
        };

        tracing::debug!(path = %req.path, offset, size = req.size, done, "read");
        self.release_handle(fd, owned);
        res
    }

    /// Receive `req.size` bytes in windows and write them at `req.offset`.
    ///
    /// The whole payload is consumed from the channel even after a disk
    /// error so the next request header is read from the right place.
    pub(crate) async fn write<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        session: &mut ConnectionSession,
        req: RwReq,
    ) -> Result<(), NetError> {
        let mut failure = None;
        let handle = match self.rw_handle(session, &req, O_WRONLY) {
            Ok(h) => Some(h),
            Err(errno) => {
                failure = Some(errno);
                None
            }
        };

        let offset = req.offset.max(0) as u64;
        let window = (req.size as usize).min(self.max_buffer_size);
        let mut buf = vec![0u8; window];
        let mut received = 0u64;
        let mut written = 0u64;
        let mut stalled = false;
        while received < req.size {
            let chunk = ((req.size - received) as usize).min(window);
            if let Err(e) = reply.recv_raw(&mut buf[..chunk]).await {
                if let Some((fd, owned)) = handle {
                    self.release_handle(fd, owned);
                }
                return Err(e);
            }
            received += chunk as u64;

            let Some((fd, _)) = handle else { continue };
            if failure.is_some() || stalled {
                continue;
            }
            match self.fs.pwrite_full(fd, &buf[..chunk], offset + written) {
                Ok(n) => {
                    written += n as u64;
                    stalled = n < chunk;
                }
                Err(partial) => {
                    written += partial.done as u64;
                    failure = Some(partial.errno);
                }
            }
        }

        let status = match failure {
            Some(errno) => StatusReply::err(errno),
            None => StatusReply::ok(written as i64),
        };
        tracing::debug!(path = %req.path, offset, size = req.size, written, ret = status.ret, "write");
        let res = reply
            .send(&RwReply {
                size: written as i64,
                last: true,
                status,
            })
            .await;

        if let Some((fd, owned)) = handle {
            if owned {
                self.release_handle(fd, true);
            } else if let Err(errno) = self.fs.fsync(fd) {
                tracing::warn!(%fd, %errno, "fsync after write failed");
            }
        }
        res
    }

    pub(crate) async fn close<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        session: &mut ConnectionSession,
        req: CloseReq,
    ) -> Result<(), NetError> {
        let status = if req.session {
            if session.forget_file(req.fd) {
                unit(self.fs.close(req.fd))
            } else {
                StatusReply::err(Errno::EBADF)
            }
        } else {
            StatusReply::ok(0)
        };
        tracing::debug!(path = %req.path, fd = %req.fd, ret = status.ret, "close");
        self.unsubscribe(req.path.as_str());
        reply.send(&status).await
    }

    pub(crate) async fn rm<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: PathReq,
    ) -> Result<(), NetError> {
        let status = unit(self.fs.unlink(req.path.as_str()));
        tracing::debug!(path = %req.path, ret = status.ret, "rm");
        reply.send(&status).await
    }

    pub(crate) fn rm_async(&self, req: PathReq) {
        if let Err(errno) = self.fs.unlink(req.path.as_str()) {
            tracing::debug!(path = %req.path, %errno, "rm_async failed");
        }
    }

    pub(crate) async fn rename<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: RenameReq,
    ) -> Result<(), NetError> {
        let status = unit(self.fs.rename(req.old_path.as_str(), req.new_path.as_str()));
        tracing::debug!(from = %req.old_path, to = %req.new_path, ret = status.ret, "rename");
        reply.send(&status).await
    }

    pub(crate) async fn getattr<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: PathReq,
    ) -> Result<(), NetError> {
        let rsp = match self.fs.stat(req.path.as_str()) {
            Ok(attr) => AttrReply {
                attr,
                status: StatusReply::ok(0),
            },
            Err(errno) => AttrReply {
                attr: Default::default(),
                status: StatusReply::err(errno),
            },
        };
        reply.send(&rsp).await
    }

    pub(crate) async fn setattr<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: SetAttrReq,
    ) -> Result<(), NetError> {
        let status = unit(self.fs.setattr(req.path.as_str(), &req.attr, req.valid));
        tracing::debug!(path = %req.path, valid = req.valid, ret = status.ret, "setattr");
        reply.send(&status).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use xpn_fs::flags::{O_CREAT, O_RDWR};
    use xpn_fs::{Filesystem, MemFilesystem};
    use xpn_proto::request::setattr_valid;
    use xpn_proto::{
        AttrReply, CloseReq, FileAttr, PathFlagsReq, PathReq, Request, RwReply, RwReq, SetAttrReq,
        StatusReply, WirePath,
    };
    use xpn_types::{DirHandle, Errno, FileHandle};

    fn p(s: &str) -> WirePath {
        WirePath::new(s).unwrap()
    }

    fn rw(path: &str, offset: i64, size: u64, fd: FileHandle, session: bool) -> RwReq {
        RwReq {
            offset,
            size,
            fd,
            session,
            path: p(path),
        }
    }

    fn seed(fs: &MemFilesystem, path: &str, data: &[u8]) {
        let fd = fs.open(path, O_RDWR | O_CREAT, 0o644).unwrap();
        fs.pwrite_full(fd, data, 0).unwrap();
        fs.close(fd).unwrap();
    }

    async fn open_session(h: &mut Harness, path: &str) -> FileHandle {
        h.run(&Request::Open(PathFlagsReq {
            flags: O_RDWR,
            mode: 0,
            session: true,
            path: p(path),
        }))
        .await;
        let status: StatusReply = h.recv().await;
        assert!(!status.is_err());
        FileHandle(status.ret)
    }

    /// Collect a streamed read: data plus the number of reply headers.
    async fn collect_read(h: &Harness) -> (Vec<u8>, usize, RwReply) {
        let mut data = Vec::new();
        let mut headers = 0;
        loop {
            let hdr: RwReply = h.recv().await;
            headers += 1;
            if hdr.size > 0 {
                data.extend(h.recv_bytes(hdr.size as usize).await);
            }
            if hdr.last {
                return (data, headers, hdr);
            }
        }
    }

    #[tokio::test]
    async fn test_stateless_open_closes_descriptor() {
        let mut h = Harness::new();
        h.run(&Request::Open(PathFlagsReq {
            flags: O_RDWR | O_CREAT,
            mode: 0o644,
            session: false,
            path: p("/f"),
        }))
        .await;
        let status: StatusReply = h.recv().await;
        assert_eq!(status, StatusReply::ok(0));
        assert_eq!(h.fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_open_missing_reports_errno() {
        let mut h = Harness::new();
        h.run(&Request::Open(PathFlagsReq {
            flags: O_RDWR,
            mode: 0,
            session: false,
            path: p("/missing"),
        }))
        .await;
        let status: StatusReply = h.recv().await;
        assert_eq!(status, StatusReply::err(Errno::ENOENT));
    }

    #[tokio::test]
    async fn test_session_reads_never_reopen() {
        let mut h = Harness::new();
        seed(&h.fs, "/f", b"0123456789");
        let fd = open_session(&mut h, "/f").await;
        let opens = h.fs.counters().opens;

        for i in 0..5u64 {
            h.run(&Request::Read(rw("/f", i as i64 * 2, 2, fd, true))).await;
            let (data, _, last) = collect_read(&h).await;
            assert_eq!(data, format!("{}{}", i * 2, i * 2 + 1).into_bytes());
            assert!(!last.status.is_err());
        }
        assert_eq!(h.fs.counters().opens, opens);
        assert_eq!(h.fs.counters().closes, 1);
    }

    #[tokio::test]
    async fn test_stateless_reads_reopen_every_call() {
        let mut h = Harness::new();
        seed(&h.fs, "/f", b"abcdef");
        let before = h.fs.counters();

        for _ in 0..4 {
            h.run(&Request::Read(rw("/f", 0, 6, FileHandle::INVALID, false))).await;
            let (data, _, _) = collect_read(&h).await;
            assert_eq!(data, b"abcdef");
        }
        let after = h.fs.counters();
        assert_eq!(after.opens - before.opens, 4);
        assert_eq!(after.closes - before.closes, 4);
        assert_eq!(h.fs.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_read_streams_in_windows_and_stops_at_eof() {
        let mut h = Harness::new();
        h.dispatcher = super::super::Dispatcher::new(h.fs.clone()).with_max_buffer_size(4);
        seed(&h.fs, "/f", b"0123456789");

        h.run(&Request::Read(rw("/f", 0, 100, FileHandle::INVALID, false))).await;
        let (data, headers, last) = collect_read(&h).await;
        assert_eq!(data, b"0123456789");
        // 4 + 4 + 2, then a zero-length header at end of file.
        assert_eq!(headers, 4);
        assert_eq!(last.size, 0);
        assert!(h.nothing_pending().await);
    }

    #[tokio::test]
    async fn test_read_with_foreign_descriptor_is_rejected() {
        let mut h = Harness::new();
        seed(&h.fs, "/f", b"x");
        let fd = h.fs.open("/f", O_RDWR, 0).unwrap();

        h.run(&Request::Read(rw("/f", 0, 1, fd, true))).await;
        let hdr: RwReply = h.recv().await;
        assert_eq!(hdr.size, -1);
        assert_eq!(hdr.status, StatusReply::err(Errno::EBADF));
        assert!(h.nothing_pending().await);
    }

    #[tokio::test]
    async fn test_out_of_range_offsets_are_rejected() {
        let mut h = Harness::new();
        seed(&h.fs, "/f", b"abc");
        let opens = h.fs.counters().opens;

        h.run(&Request::Read(rw("/f", i64::MAX - 1, 100, FileHandle::INVALID, false))).await;
        let hdr: RwReply = h.recv().await;
        assert_eq!(hdr.status, StatusReply::err(Errno::EINVAL));
        assert!(hdr.last);

        h.run(&Request::Read(rw("/f", -1, 1, FileHandle::INVALID, false))).await;
        let hdr: RwReply = h.recv().await;
        assert_eq!(hdr.status, StatusReply::err(Errno::EINVAL));

        h.run_with_data(
            &Request::Write(rw("/f", i64::MAX - 2, 5, FileHandle::INVALID, false)),
            b"hello",
        )
        .await;
        let rsp: RwReply = h.recv().await;
        assert_eq!(rsp.size, 0);
        assert_eq!(rsp.status, StatusReply::err(Errno::EINVAL));
        assert!(h.nothing_pending().await);

        assert_eq!(h.fs.counters().opens, opens);
        assert_eq!(h.fs.contents("/f").unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_write_completes_over_short_backing_writes() {
        let mut h = Harness::with_fs(MemFilesystem::new().with_max_io_chunk(3));
        h.dispatcher = super::super::Dispatcher::new(h.fs.clone()).with_max_buffer_size(8);
        let payload: Vec<u8> = (0..50u8).collect();

        h.run_with_data(&Request::Write(rw("/w", 0, 50, FileHandle::INVALID, false)), &payload)
            .await;
        let rsp: RwReply = h.recv().await;
        assert_eq!(rsp.size, 50);
        assert_eq!(rsp.status, StatusReply::ok(50));
        assert!(h.nothing_pending().await);
        assert_eq!(h.fs.contents("/w").unwrap(), payload);
        assert!(h.fs.counters().pwrites > 50 / 3);
    }

    #[tokio::test]
    async fn test_write_error_reports_partial_count_and_keeps_framing() {
        let mut h = Harness::with_fs(MemFilesystem::new().with_max_io_chunk(4));
        h.dispatcher = super::super::Dispatcher::new(h.fs.clone()).with_max_buffer_size(8);
        h.fs.set_write_budget(Some(10));
        let payload = vec![7u8; 32];

        h.run_with_data(&Request::Write(rw("/w", 0, 32, FileHandle::INVALID, false)), &payload)
            .await;
        let rsp: RwReply = h.recv().await;
        assert_eq!(rsp.size, 10);
        assert_eq!(rsp.status, StatusReply::err(Errno::ENOSPC));

        // The rest of the payload was consumed; the next request parses.
        h.run(&Request::GetAttr(PathReq { path: p("/w") })).await;
        let attr: AttrReply = h.recv().await;
        assert_eq!(attr.attr.size, 10);
    }

    #[tokio::test]
    async fn test_write_to_unopenable_path_drains_payload() {
        let mut h = Harness::new();
        h.run_with_data(
            &Request::Write(rw("/no/such/dir", 0, 5, FileHandle::INVALID, false)),
            b"hello",
        )
        .await;
        let rsp: RwReply = h.recv().await;
        assert_eq!(rsp.size, 0);
        assert_eq!(rsp.status.server_errno, Errno::ENOENT);
        assert!(h.nothing_pending().await);
    }

    #[tokio::test]
    async fn test_session_write_then_close() {
        let mut h = Harness::new();
        seed(&h.fs, "/s", b"");
        let fd = open_session(&mut h, "/s").await;

        h.run_with_data(&Request::Write(rw("/s", 3, 2, fd, true)), b"hi").await;
        let rsp: RwReply = h.recv().await;
        assert_eq!(rsp.size, 2);
        assert_eq!(h.fs.counters().fsyncs, 1);
        assert_eq!(h.fs.open_handles(), 1);

        let close = CloseReq {
            fd,
            dir: DirHandle::INVALID,
            session: true,
            path: p("/s"),
        };
        h.run(&Request::Close(close.clone())).await;
        assert_eq!(h.recv::<StatusReply>().await, StatusReply::ok(0));
        assert_eq!(h.fs.open_handles(), 0);
        assert_eq!(h.fs.contents("/s").unwrap(), b"\0\0\0hi");

        // A second close of the same descriptor is refused.
        h.run(&Request::Close(close)).await;
        assert_eq!(h.recv::<StatusReply>().await, StatusReply::err(Errno::EBADF));
    }

    #[tokio::test]
    async fn test_setattr_truncates() {
        let mut h = Harness::new();
        seed(&h.fs, "/t", b"0123456789");
        h.run(&Request::SetAttr(SetAttrReq {
            valid: setattr_valid::SIZE | setattr_valid::MODE,
            attr: FileAttr {
                size: 4,
                mode: 0o600,
                ..Default::default()
            },
            path: p("/t"),
        }))
        .await;
        assert_eq!(h.recv::<StatusReply>().await, StatusReply::ok(0));

        let attr = h.fs.stat("/t").unwrap();
        assert_eq!(attr.size, 4);
        assert_eq!(attr.permissions(), 0o600);
    }
}
