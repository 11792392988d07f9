use xpn_net::{Comm, NetError};
use xpn_proto::{
    CloseReq, OpendirReply, PathFlagsReq, PathReq, ReaddirReply, ReaddirReq, StatusReply,
    StatvfsReply,
};
use xpn_types::{DirHandle, Errno};

use super::{Dispatcher, Reply};
use crate::session::ConnectionSession;

impl Dispatcher {
    pub(crate) async fn mkdir<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: PathFlagsReq,
    ) -> Result<(), NetError> {
        let status = StatusReply::from_result(self.fs.mkdir(req.path.as_str(), req.mode).map(|()| 0));
        tracing::debug!(path = %req.path, mode = req.mode, ret = status.ret, "mkdir");
        reply.send(&status).await
    }

    pub(crate) async fn rmdir<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: PathReq,
    ) -> Result<(), NetError> {
        let status = StatusReply::from_result(self.fs.rmdir(req.path.as_str()).map(|()| 0));
        tracing::debug!(path = %req.path, ret = status.ret, "rmdir");
        reply.send(&status).await
    }

    pub(crate) fn rmdir_async(&self, req: PathReq) {
        if let Err(errno) = self.fs.rmdir(req.path.as_str()) {
            tracing::debug!(path = %req.path, %errno, "rmdir_async failed");
        }
    }

    /// Session: hand out a live handle. Stateless: report the start
    /// position in `ret` and close the handle again.
    pub(crate) async fn opendir<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        session: &mut ConnectionSession,
        req: PathFlagsReq,
    ) -> Result<(), NetError> {
        let rsp = match self.open_dir_at_start(req.path.as_str()) {
            Ok((dir, pos)) if req.session => {
                session.track_dir(dir);
                OpendirReply {
                    dir,
                    status: StatusReply::ok(pos),
                }
            }
            Ok((dir, pos)) => {
                let status = match self.fs.closedir(dir) {
                    Ok(()) => StatusReply::ok(pos),
                    Err(errno) => StatusReply::err(errno),
                };
                OpendirReply {
                    dir: DirHandle::INVALID,
                    status,
                }
            }
            Err(errno) => OpendirReply {
                dir: DirHandle::INVALID,
                status: StatusReply::err(errno),
            },
        };
        tracing::debug!(path = %req.path, session = req.session, ret = rsp.status.ret, "opendir");
        reply.send(&rsp).await
    }

    fn open_dir_at_start(&self, path: &str) -> Result<(DirHandle, i64), Errno> {
        let dir = self.fs.opendir(path)?;
        match self.fs.telldir(dir) {
            Ok(pos) => Ok((dir, pos)),
            Err(errno) => {
                if let Err(close_errno) = self.fs.closedir(dir) {
                    tracing::debug!(%dir, errno = %close_errno, "closedir after telldir failed");
                }
                Err(errno)
            }
        }
    }

    /// Return one entry and the position after it.
    ///
    /// Stateless calls reopen the directory, seek to `req.telldir`, read one
    /// entry and close, so iteration resumes across independent requests.
    pub(crate) async fn readdir<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        session: &mut ConnectionSession,
        req: ReaddirReq,
    ) -> Result<(), NetError> {
        let res = if req.session {
            if session.owns_dir(req.dir) {
                self.next_entry(req.dir)
            } else {
                Err(Errno::EBADF)
            }
        } else {
            self.next_entry_at(req.path.as_str(), req.telldir)
        };

        let rsp = match res {
            Ok((entry, telldir)) => ReaddirReply {
                has_entry: entry.is_some(),
                entry: entry.unwrap_or_default(),
                telldir,
                status: StatusReply::ok(0),
            },
            Err(errno) => ReaddirReply {
                status: StatusReply::err(errno),
                ..Default::default()
            },
        };
        tracing::trace!(path = %req.path, has_entry = rsp.has_entry, telldir = rsp.telldir, "readdir");
        reply.send(&rsp).await
    }

    fn next_entry(&self, dir: DirHandle) -> Result<(Option<xpn_proto::DirEntry>, i64), Errno> {
        let entry = self.fs.readdir(dir)?;
        Ok((entry, self.fs.telldir(dir)?))
    }

    fn next_entry_at(
        &self,
        path: &str,
        pos: i64,
    ) -> Result<(Option<xpn_proto::DirEntry>, i64), Errno> {
        let dir = self.fs.opendir(path)?;
        let res = self
            .fs
            .seekdir(dir, pos)
            .and_then(|()| self.next_entry(dir));
        let closed = self.fs.closedir(dir);
        let out = res?;
        closed?;
        Ok(out)
    }

    pub(crate) async fn closedir<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        session: &mut ConnectionSession,
        req: CloseReq,
    ) -> Result<(), NetError> {
        let status = if req.session {
            if session.forget_dir(req.dir) {
                StatusReply::from_result(self.fs.closedir(req.dir).map(|()| 0))
            } else {
                StatusReply::err(Errno::EBADF)
            }
        } else {
            StatusReply::ok(0)
        };
        tracing::debug!(path = %req.path, dir = %req.dir, ret = status.ret, "closedir");
        reply.send(&status).await
    }

    pub(crate) async fn statvfs<C: Comm + ?Sized>(
        &self,
        reply: &Reply<'_, C>,
        req: PathReq,
    ) -> Result<(), NetError> {
        let rsp = match self.fs.statvfs(req.path.as_str()) {
            Ok(stats) => StatvfsReply {
                stats,
                status: StatusReply::ok(0),
            },
            Err(errno) => StatvfsReply {
                stats: Default::default(),
                status: StatusReply::err(errno),
            },
        };
        reply.send(&rsp).await
    }
}
